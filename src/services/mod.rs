pub(crate) mod assignment;
pub(crate) mod deadline;
pub(crate) mod dialog_state;
pub(crate) mod error;
pub(crate) mod grades;
pub(crate) mod grading;
pub(crate) mod identity;
pub(crate) mod late_days;
pub(crate) mod retry;
pub(crate) mod submissions;

#[cfg(test)]
pub(crate) fn test_settings(n_graders: usize) -> crate::core::config::ReviewSettings {
    use std::collections::BTreeMap;

    use time::macros::datetime;

    let deadlines = BTreeMap::from([
        (1, datetime!(2019-03-08 0:00)),
        (2, datetime!(2019-03-23 0:00)),
        (3, datetime!(2019-04-18 0:00)),
        (4, datetime!(2019-04-27 0:00)),
    ]);

    crate::core::config::ReviewSettings {
        n_graders,
        max_late: 3,
        default_late_days: 12,
        max_task_number: 7,
        claim_rounds: 3,
        conflict_retries: 3,
        deadlines,
    }
}
