use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use super::domain::{CompanyId, Owner, PipelineStage, StageId, StageTemplate};
use super::error::PipelineError;
use super::store::{PipelineStore, PipelineTransaction};

/// Per-owner stage sets, provisioned from the global defaults on first touch.
pub struct StageCatalog<S> {
    store: Arc<S>,
}

impl<S> StageCatalog<S>
where
    S: PipelineStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Seed the global default set. Leaves an already seeded set untouched.
    pub fn seed_defaults(
        &self,
        templates: &[StageTemplate],
    ) -> Result<Vec<PipelineStage>, PipelineError> {
        self.store.atomically(|tx| -> Result<_, PipelineError> {
            let existing = tx.stages(Owner::Global)?;
            if !existing.is_empty() {
                return Ok(existing);
            }
            let seeded = tx.insert_stages(Owner::Global, templates)?;
            tracing::info!(stages = seeded.len(), "seeded global default stages");
            Ok(seeded)
        })
    }

    /// Stages of `owner`, cloning the global defaults first if it has none.
    pub fn ensure(&self, owner: Owner) -> Result<Vec<PipelineStage>, PipelineError> {
        self.store.atomically(|tx| ensure_stages(tx, owner))
    }

    /// Stages of `owner` ordered by position, without provisioning.
    pub fn list(&self, owner: Owner) -> Result<Vec<PipelineStage>, PipelineError> {
        self.store
            .atomically(|tx| -> Result<_, PipelineError> { Ok(tx.stages(owner)?) })
    }

    /// Replace a company's stage order. `ordered` must name every current stage exactly once.
    pub fn reorder(
        &self,
        company: CompanyId,
        ordered: &[StageId],
    ) -> Result<Vec<PipelineStage>, PipelineError> {
        let owner = Owner::Company(company);
        self.store.atomically(|tx| -> Result<_, PipelineError> {
            let current = ensure_stages(tx, owner)?;
            check_permutation(&current, ordered)?;

            let positions: Vec<(StageId, u32)> = ordered
                .iter()
                .enumerate()
                .map(|(index, id)| (*id, index as u32 + 1))
                .collect();
            tx.set_positions(owner, &positions)?;

            tracing::info!(%owner, stages = positions.len(), "pipeline stages reordered");
            Ok(tx.stages(owner)?)
        })
    }
}

/// Provisioning step shared by every operation that touches an owner's stages.
pub(crate) fn ensure_stages(
    tx: &mut dyn PipelineTransaction,
    owner: Owner,
) -> Result<Vec<PipelineStage>, PipelineError> {
    let existing = tx.stages(owner)?;
    if !existing.is_empty() {
        return Ok(existing);
    }

    let defaults = tx.stages(Owner::Global)?;
    if defaults.is_empty() {
        return Err(PipelineError::MissingDefaults);
    }
    if owner == Owner::Global {
        return Ok(defaults);
    }

    let templates: Vec<StageTemplate> = defaults.iter().map(StageTemplate::from).collect();
    tx.insert_stages(owner, &templates)?;
    tracing::info!(%owner, stages = templates.len(), "provisioned pipeline stages from defaults");

    Ok(tx.stages(owner)?)
}

fn check_permutation(current: &[PipelineStage], ordered: &[StageId]) -> Result<(), PipelineError> {
    let known: BTreeSet<StageId> = current.iter().map(|stage| stage.id).collect();

    let mut seen = HashSet::new();
    let mut duplicated = BTreeSet::new();
    for id in ordered {
        if !seen.insert(*id) {
            duplicated.insert(*id);
        }
    }

    let submitted: BTreeSet<StageId> = ordered.iter().copied().collect();
    let missing: Vec<StageId> = known.difference(&submitted).copied().collect();
    let unexpected: Vec<StageId> = submitted.difference(&known).copied().collect();

    if missing.is_empty() && unexpected.is_empty() && duplicated.is_empty() {
        return Ok(());
    }

    Err(PipelineError::StageSetMismatch {
        missing,
        unexpected,
        duplicated: duplicated.into_iter().collect(),
    })
}

/// Whether positions form the dense sequence 1..n.
pub fn positions_are_dense(stages: &[PipelineStage]) -> bool {
    let mut positions: Vec<u32> = stages.iter().map(|stage| stage.position).collect();
    positions.sort_unstable();
    positions
        .iter()
        .enumerate()
        .all(|(index, position)| *position as usize == index + 1)
}
