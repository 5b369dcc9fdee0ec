use crate::context::{operation_id, EngineContext, JournalDraft};
use crate::error::EngineError;
use crate::status::{PackageStatus, Platform, VerificationStatus};
use crate::types::{AmountMinor, CreatorProfile, Package};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Creator profiles, identity verification, and service packages.
#[derive(Clone)]
pub struct CreatorRegistry {
    ctx: Arc<EngineContext>,
}

impl CreatorRegistry {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn profile(&self, profile_id: &str) -> Result<CreatorProfile, EngineError> {
        Ok(self.ctx.store.read()?.profiles.get(profile_id)?.clone())
    }

    pub fn package(&self, package_id: &str) -> Result<Package, EngineError> {
        Ok(self.ctx.store.read()?.packages.get(package_id)?.clone())
    }

    pub async fn register(&self, display_name: &str) -> Result<CreatorProfile, EngineError> {
        let op_id = operation_id();
        let profile = CreatorProfile::new(display_name);

        let _lane = self.ctx.write_lane.lock().await;
        self.ctx
            .journal_all(
                &op_id,
                vec![JournalDraft::note(
                    Some(format!("creator_profile:{}", profile.id)),
                    "creator profile registered, verification pending",
                )],
            )
            .await?;
        self.ctx.store.write()?.profiles.insert(profile.clone())?;
        info!(profile_id = %profile.id, "creator registered");
        Ok(profile)
    }

    /// Reviewer decision on a pending profile.
    pub async fn review(
        &self,
        profile_id: &str,
        approve: bool,
    ) -> Result<CreatorProfile, EngineError> {
        let target = if approve {
            VerificationStatus::Approved
        } else {
            VerificationStatus::Rejected
        };
        self.transition_profile(profile_id, target).await
    }

    /// A rejected creator may re-enter the verification queue.
    pub async fn resubmit_verification(
        &self,
        profile_id: &str,
    ) -> Result<CreatorProfile, EngineError> {
        self.transition_profile(profile_id, VerificationStatus::Pending)
            .await
    }

    async fn transition_profile(
        &self,
        profile_id: &str,
        target: VerificationStatus,
    ) -> Result<CreatorProfile, EngineError> {
        let op_id = operation_id();
        let snapshot = self.profile(profile_id)?;
        if !snapshot.verification_status.can_advance(target) {
            return Err(EngineError::invalid_transition(
                "creator_profile",
                profile_id,
                snapshot.verification_status.as_str(),
                target.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (profile, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.profiles.expect_version(profile_id, snapshot.version)?;
            let mut profile = inner.profiles.get(profile_id)?.clone();
            let drafts = vec![JournalDraft::transition(
                "creator_profile",
                profile_id,
                profile.verification_status,
                target,
            )];
            profile.verification_status = target;
            profile.reviewed_at = Some(Utc::now());
            (profile, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        self.ctx.store.write()?.profiles.put(profile)?;
        self.profile(profile_id)
    }

    /// List a service package. Only verified creators may sell.
    pub async fn create_package(
        &self,
        creator_id: &str,
        name: &str,
        platform: Platform,
        price_minor: AmountMinor,
    ) -> Result<Package, EngineError> {
        if price_minor <= 0 {
            return Err(EngineError::constraint("package price must be positive"));
        }
        let op_id = operation_id();
        let snapshot = self.profile(creator_id)?;
        if snapshot.verification_status != VerificationStatus::Approved {
            return Err(EngineError::VerificationRequired(format!(
                "creator {creator_id} is {} and may not list packages",
                snapshot.verification_status
            )));
        }

        let package = Package {
            id: Uuid::new_v4().to_string(),
            creator_id: creator_id.to_string(),
            name: name.to_string(),
            platform,
            price_minor,
            status: PackageStatus::Active,
            version: 1,
            created_at: Utc::now(),
        };

        let _lane = self.ctx.write_lane.lock().await;
        self.ctx
            .journal_all(
                &op_id,
                vec![JournalDraft::note(
                    Some(format!("package:{}", package.id)),
                    format!("package listed by creator {creator_id}"),
                )],
            )
            .await?;
        self.ctx.store.write()?.packages.insert(package.clone())?;
        Ok(package)
    }

    pub async fn set_package_status(
        &self,
        package_id: &str,
        target: PackageStatus,
    ) -> Result<Package, EngineError> {
        let op_id = operation_id();
        let snapshot = self.package(package_id)?;
        if !snapshot.status.can_advance(target) {
            return Err(EngineError::invalid_transition(
                "package",
                package_id,
                snapshot.status.as_str(),
                target.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (package, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.packages.expect_version(package_id, snapshot.version)?;
            let mut package = inner.packages.get(package_id)?.clone();
            let drafts = vec![JournalDraft::transition(
                "package",
                package_id,
                package.status,
                target,
            )];
            package.status = target;
            (package, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        self.ctx.store.write()?.packages.put(package)?;
        self.package(package_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::storage::PersistentJournal;

    fn registry() -> CreatorRegistry {
        CreatorRegistry::new(Arc::new(EngineContext::new(
            EngineConfig::default(),
            PersistentJournal::from_entries(Vec::new()).unwrap(),
        )))
    }

    #[tokio::test]
    async fn verification_flow_with_resubmission() {
        let registry = registry();
        let profile = registry.register("Amina").await.unwrap();
        assert_eq!(profile.verification_status, VerificationStatus::Pending);

        let rejected = registry.review(&profile.id, false).await.unwrap();
        assert_eq!(rejected.verification_status, VerificationStatus::Rejected);

        let pending = registry.resubmit_verification(&profile.id).await.unwrap();
        assert_eq!(pending.verification_status, VerificationStatus::Pending);

        let approved = registry.review(&profile.id, true).await.unwrap();
        assert_eq!(approved.verification_status, VerificationStatus::Approved);

        // approved is terminal
        let err = registry.review(&profile.id, false).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn unverified_creator_cannot_list_packages() {
        let registry = registry();
        let profile = registry.register("Amina").await.unwrap();
        let err = registry
            .create_package(&profile.id, "Reel bundle", Platform::Instagram, 5_000)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::VerificationRequired(_)));
    }

    #[tokio::test]
    async fn package_pause_resume_delete() {
        let registry = registry();
        let profile = registry.register("Amina").await.unwrap();
        registry.review(&profile.id, true).await.unwrap();
        let package = registry
            .create_package(&profile.id, "Reel bundle", Platform::Instagram, 5_000)
            .await
            .unwrap();

        registry
            .set_package_status(&package.id, PackageStatus::Paused)
            .await
            .unwrap();
        registry
            .set_package_status(&package.id, PackageStatus::Active)
            .await
            .unwrap();
        let deleted = registry
            .set_package_status(&package.id, PackageStatus::Deleted)
            .await
            .unwrap();
        assert_eq!(deleted.status, PackageStatus::Deleted);

        let err = registry
            .set_package_status(&package.id, PackageStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }
}
