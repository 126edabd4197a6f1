//! Legacy record migrations.
//!
//! Each [`Migration`] checks its own precondition per record and changes
//! only what still needs changing, so steps can run in any order and any
//! number of times. A step runs in its own consistent write scope: a failed
//! step leaves no partial changes, and steps before it stay committed.

mod backfill_local_key;
mod fix_qr_private_key;
mod people_to_persona;

pub use backfill_local_key::BackfillLocalKey;
pub use fix_qr_private_key::FixQrPrivateKey;
pub use people_to_persona::{LegacyPerson, PeopleToPersona};
use tracing::info;

use crate::{
    db::PersonaDb,
    env::Environment,
    error::IdentityError,
    storage::{Storage, Transaction},
};

/// One idempotent migration step.
pub trait Migration<S: Storage>: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Apply the step inside `txn`. Returns the number of records changed;
    /// zero once the step has been applied.
    fn apply(&self, txn: &mut Transaction<'_, S>) -> Result<usize, IdentityError>;
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Step name
    pub name: &'static str,
    /// Records changed by the step
    pub changed: usize,
}

/// Outcome of a migration run, in step order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// One entry per step that ran
    pub steps: Vec<StepReport>,
}

impl MigrationReport {
    /// Records changed across all steps.
    pub fn total_changed(&self) -> usize {
        self.steps.iter().map(|step| step.changed).sum()
    }
}

/// Run `steps` in order, each in its own write scope.
///
/// # Errors
///
/// The first failing step's error. Steps before it stay committed.
pub async fn run_migrations<S: Storage, E: Environment>(
    db: &PersonaDb<S, E>,
    steps: &[&dyn Migration<S>],
) -> Result<MigrationReport, IdentityError> {
    let mut report = MigrationReport::default();

    for step in steps {
        let changed = db.consistent_write_access(|txn| step.apply(txn)).await?;
        info!(step = step.name(), changed, "migration step done");
        report.steps.push(StepReport { name: step.name(), changed });
    }

    Ok(report)
}

/// The steps every store runs at startup, in their usual order.
pub fn default_steps<S: Storage>(legacy: &PeopleToPersona) -> [&dyn Migration<S>; 3] {
    [legacy, &FixQrPrivateKey, &BackfillLocalKey]
}
