use super::domain::{ActorContext, ActorRole, Application, Owner};

/// Chooses the stage catalog that governs a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageOwnerResolver;

impl StageOwnerResolver {
    /// Catalog the caller manages: their company's, or the global defaults.
    pub fn resolve(&self, actor: &ActorContext) -> Owner {
        match (actor.role, actor.company_id) {
            (ActorRole::Company, Some(company)) => Owner::Company(company),
            _ => Owner::Global,
        }
    }

    /// Catalog governing an application, which is always its job owner's.
    pub fn for_application(&self, application: &Application) -> Owner {
        application.job_owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::pipeline::domain::{CompanyId, UserId};

    #[test]
    fn company_users_resolve_to_their_company() {
        let resolver = StageOwnerResolver;
        let actor = ActorContext::company(UserId(5), CompanyId(9));
        assert_eq!(resolver.resolve(&actor), Owner::Company(CompanyId(9)));
    }

    #[test]
    fn everyone_else_resolves_to_global() {
        let resolver = StageOwnerResolver;
        let orphaned_company_user = ActorContext {
            user_id: Some(UserId(5)),
            role: ActorRole::Company,
            company_id: None,
        };
        let institution_user = ActorContext {
            user_id: Some(UserId(6)),
            role: ActorRole::Institution,
            company_id: Some(CompanyId(9)),
        };

        for actor in [
            ActorContext::guest(),
            ActorContext::graduate(UserId(1)),
            ActorContext::peso(UserId(2)),
            orphaned_company_user,
            institution_user,
        ] {
            assert_eq!(resolver.resolve(&actor), Owner::Global);
        }
    }
}
