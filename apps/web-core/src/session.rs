//! One page navigation: the explicit initialisation sequence plus the
//! paywall-then-checkout flow for follow-up features.

use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use crate::analysis_state::{AnalysisApi, AnalysisMachine, AnalysisPhase, AnalysisSubmission};
use crate::entitlements::{can_access, EntitlementState, Feature};
use crate::reconciler::{
    prepare_checkout, CheckoutUrls, Notice, ReconcileStep, Reconciler, Reconciliation,
};
use crate::storage::{clear_all, CheckoutStore, DurableStore, KeyValueStore, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureAccess {
    Granted,
    /// Not yet purchased; send the user to checkout with these return URLs.
    CheckoutRequired(CheckoutUrls),
}

pub struct PageSession {
    url: Url,
    entitlements: EntitlementState,
    notice: Option<Notice>,
    reconciler: Reconciler,
    analysis: AnalysisMachine,
    durable: DurableStore,
    checkout: CheckoutStore,
}

impl PageSession {
    /// A full page load at `url`. Runs the initialisation sequence once.
    pub fn load(local: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>, url: Url) -> Self {
        let durable = DurableStore::new(local);
        let checkout = CheckoutStore::new(session);
        let mut page = Self {
            url,
            entitlements: EntitlementState::default(),
            notice: None,
            reconciler: Reconciler::new(durable.clone(), checkout.clone()),
            analysis: AnalysisMachine::new(durable.clone()),
            durable,
            checkout,
        };

        if page.reconcile_pass().0 == ReconcileStep::Cancelled {
            // The cleaned URL has no signal, so this pass reads the durable record.
            page.reconcile_pass();
        }
        if page.analysis.report().is_none() && page.analysis.restore_from_storage() {
            debug!("Showing cached analysis from a previous visit");
        }
        page
    }

    /// One reconciliation pass. Safe to repeat within the same navigation.
    /// Returns whether a pre-checkout snapshot was put back on screen.
    pub fn reconcile(&mut self) -> bool {
        self.reconcile_pass().1
    }

    fn reconcile_pass(&mut self) -> (ReconcileStep, bool) {
        let Reconciliation {
            step,
            entitlements,
            restored,
            notice,
            clean_url,
        } = self.reconciler.reconcile(self.entitlements, &self.url);

        debug!(?step, "Entitlements reconciled");
        self.entitlements = entitlements;
        if notice.is_some() {
            self.notice = notice;
        }
        if let Some(url) = clean_url {
            self.url = url;
        }
        let shown = match restored {
            Some(snapshot) => {
                self.analysis.restore_snapshot(snapshot);
                true
            }
            None => false,
        };
        (step, shown)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn entitlements(&self) -> EntitlementState {
        self.entitlements
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn analysis(&self) -> &AnalysisPhase {
        self.analysis.phase()
    }

    pub fn analysis_machine(&self) -> &AnalysisMachine {
        &self.analysis
    }

    pub async fn submit_analysis(
        &mut self,
        api: &dyn AnalysisApi,
        submission: AnalysisSubmission,
    ) -> &AnalysisPhase {
        self.analysis.submit(api, submission).await
    }

    /// Paywall check; on denial, snapshots the page and returns checkout URLs.
    pub fn request_feature(&self, feature: Feature) -> Result<FeatureAccess, StorageError> {
        if can_access(feature, &self.entitlements) {
            return Ok(FeatureAccess::Granted);
        }
        info!(feature = %feature, "Feature locked, preparing checkout");
        let urls = prepare_checkout(
            &self.checkout,
            self.analysis.report(),
            self.analysis.job_description(),
            &self.url,
            feature,
        )?;
        Ok(FeatureAccess::CheckoutRequired(urls))
    }

    /// Starts over. Purchased entitlements stay.
    pub fn reset_analysis(&mut self) {
        self.analysis.reset();
        self.checkout.clear();
    }

    /// Drops everything this client stored, entitlements included.
    pub fn logout(&mut self) {
        clear_all(&self.durable, &self.checkout);
        self.analysis.reset();
        self.entitlements = EntitlementState::default();
        self.notice = None;
        info!("Client state cleared on logout");
    }
}
