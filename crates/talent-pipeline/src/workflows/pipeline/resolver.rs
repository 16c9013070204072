use super::actions::{ActionKey, PipelineAction};
use super::domain::{Application, ApplicationStatus, Party, PipelineStage, TerminalFamily};
use super::error::PipelineError;

/// Computes the legal actions for an application from its owner's stage catalog.
///
/// Pure and stateless, so it is shared freely between the service, the executor, and
/// request handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineActionResolver;

impl PipelineActionResolver {
    /// Legal actions for `party`, in presentation order. `stages` must be position ordered.
    pub fn for_application(
        &self,
        application: &Application,
        stages: &[PipelineStage],
        party: Party,
    ) -> Result<Vec<PipelineAction>, PipelineError> {
        let current = locate_stage(stages, &application.stage)?;

        if current.is_terminal {
            return Ok(vec![PipelineAction::new(ActionKey::ViewFeedback)]);
        }

        let mut actions = Vec::new();
        match party {
            Party::Employer => {
                if let Some(next) = self.next_stage(stages, current) {
                    actions.push(
                        PipelineAction::new(ActionKey::MoveNext).targeting(&next.slug, &next.name),
                    );
                }
                actions.extend(
                    employer_capabilities(&current.slug)
                        .iter()
                        .copied()
                        .map(PipelineAction::new),
                );
                actions.push(PipelineAction::new(ActionKey::Reject));
                actions.push(PipelineAction::new(ActionKey::RejectWithdraw));
            }
            Party::Applicant => {
                if is_offer_stage(&current.slug) {
                    if application.status != ApplicationStatus::OfferAccepted {
                        actions.push(PipelineAction::new(ActionKey::AcceptOffer));
                    }
                    actions.push(PipelineAction::new(ActionKey::DeclineOffer));
                }
                actions.push(PipelineAction::new(ActionKey::Withdraw));
            }
        }

        Ok(actions)
    }

    /// Next active stage after `current` by position.
    pub fn next_stage<'a>(
        &self,
        stages: &'a [PipelineStage],
        current: &PipelineStage,
    ) -> Option<&'a PipelineStage> {
        stages
            .iter()
            .find(|stage| stage.active && stage.position > current.position)
    }

    /// Terminal stage representing `family`, falling back to the closest outcome the
    /// catalog does define.
    pub fn terminal_target<'a>(
        &self,
        stages: &'a [PipelineStage],
        family: TerminalFamily,
    ) -> Result<&'a PipelineStage, PipelineError> {
        let preference: &[TerminalFamily] = match family {
            TerminalFamily::Hired => &[TerminalFamily::Hired],
            TerminalFamily::Rejected => &[TerminalFamily::Rejected],
            TerminalFamily::Withdrawn => &[TerminalFamily::Withdrawn, TerminalFamily::Rejected],
            TerminalFamily::Declined => &[
                TerminalFamily::Declined,
                TerminalFamily::Withdrawn,
                TerminalFamily::Rejected,
            ],
        };

        preference
            .iter()
            .find_map(|wanted| {
                stages.iter().find(|stage| {
                    stage.active
                        && stage.is_terminal
                        && TerminalFamily::classify(&stage.slug) == *wanted
                })
            })
            .ok_or_else(|| PipelineError::UnknownStage(format!("{family:?} terminal stage")))
    }
}

/// Find a stage by slug in a catalog.
pub(crate) fn locate_stage<'a>(
    stages: &'a [PipelineStage],
    slug: &str,
) -> Result<&'a PipelineStage, PipelineError> {
    stages
        .iter()
        .find(|stage| stage.slug == slug)
        .ok_or_else(|| PipelineError::UnknownStage(slug.to_string()))
}

fn is_offer_stage(slug: &str) -> bool {
    slug == "offer"
}

/// Stage-specific employer actions. Slugs outside the table only get the generic moves.
fn employer_capabilities(slug: &str) -> &'static [ActionKey] {
    match slug {
        "applied" | "screening" => &[ActionKey::RequestMoreInfo],
        "assessment" => &[
            ActionKey::SendExamInstructions,
            ActionKey::RecordTestResults,
            ActionKey::RescheduleTest,
        ],
        "interview" => &[
            ActionKey::ScheduleInterview,
            ActionKey::RescheduleInterview,
            ActionKey::RecordInterviewFeedback,
        ],
        "offer" => &[ActionKey::SendOffer, ActionKey::Hire],
        _ => &[],
    }
}
