//! Page-load entitlement reconciliation and checkout preparation.
//!
//! Sources of truth, in priority order:
//! 1. a cancellation signal in the redirect URL,
//! 2. a success signal in the redirect URL (sets the one-shot guard),
//! 3. the durable entitlement record, read only when no signal is present
//!    and the guard is not set.
//!
//! A `Reconciler` lives for exactly one page load; constructing a new one is a
//! full reload and therefore drops the guard.

use cvlens_contract::ReportContract;
use tracing::{debug, info, warn};
use url::Url;

use crate::entitlements::{EntitlementState, Feature};
use crate::storage::{CheckoutSnapshot, CheckoutStore, DurableStore, StorageError};

pub const PAYMENT_SUCCESS_PARAM: &str = "payment_success";
pub const PAYMENT_CANCELLED_PARAM: &str = "payment_cancelled";
pub const FEATURE_PARAM: &str = "feature";

/// Redirect signal carried in the page URL after an external checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentSignal {
    Cancelled,
    /// `feature` is the raw id from the URL; it may not name a known feature.
    Success { feature: Option<String> },
}

impl PaymentSignal {
    /// Cancellation wins when both flags are present.
    pub fn from_url(url: &Url) -> Option<Self> {
        let mut success = false;
        let mut cancelled = false;
        let mut feature = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                PAYMENT_SUCCESS_PARAM => success |= value == "true",
                PAYMENT_CANCELLED_PARAM => cancelled |= value == "true",
                FEATURE_PARAM => feature = Some(value.into_owned()),
                _ => {}
            }
        }

        if cancelled {
            Some(PaymentSignal::Cancelled)
        } else if success {
            Some(PaymentSignal::Success { feature })
        } else {
            None
        }
    }
}

/// Removes the payment parameters, keeping any others in their original order.
pub fn strip_payment_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| {
            !matches!(
                key.as_ref(),
                PAYMENT_SUCCESS_PARAM | PAYMENT_CANCELLED_PARAM | FEATURE_PARAM
            )
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut clean = url.clone();
    if kept.is_empty() {
        clean.set_query(None);
    } else {
        clean.query_pairs_mut().clear().extend_pairs(kept);
    }
    clean
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    Cancelled,
    Granted,
    /// Success signal whose feature id was missing or unknown.
    SuccessWithoutGrant,
    LoadedDurable,
    /// The guard from a just-completed payment suppressed the durable load.
    GuardConsumed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    PaymentCancelled,
    PaymentSucceeded(Feature),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub step: ReconcileStep,
    pub entitlements: EntitlementState,
    /// Pre-checkout state to put back on screen.
    pub restored: Option<CheckoutSnapshot>,
    pub notice: Option<Notice>,
    /// Replacement page URL when payment parameters were stripped.
    pub clean_url: Option<Url>,
}

pub struct Reconciler {
    durable: DurableStore,
    checkout: CheckoutStore,
    just_paid: bool,
}

impl Reconciler {
    pub fn new(durable: DurableStore, checkout: CheckoutStore) -> Self {
        Self {
            durable,
            checkout,
            just_paid: false,
        }
    }

    pub fn guard_is_set(&self) -> bool {
        self.just_paid
    }

    /// Runs the ordered merge for one render of the page at `url`.
    pub fn reconcile(&mut self, current: EntitlementState, url: &Url) -> Reconciliation {
        match PaymentSignal::from_url(url) {
            Some(PaymentSignal::Cancelled) => {
                info!("Checkout cancelled, restoring pre-checkout snapshot");
                Reconciliation {
                    step: ReconcileStep::Cancelled,
                    entitlements: current,
                    restored: self.checkout.take_snapshot(),
                    notice: Some(Notice::PaymentCancelled),
                    clean_url: Some(strip_payment_params(url)),
                }
            }
            Some(PaymentSignal::Success { feature }) => {
                let restored = self.checkout.take_snapshot();
                self.just_paid = true;

                // Earlier purchases are folded in so the persisted record never shrinks.
                let mut entitlements =
                    current.merge(self.durable.load_entitlements().unwrap_or_default());
                let granted = match feature.as_deref().map(str::parse::<Feature>) {
                    Some(Ok(feature)) => {
                        entitlements.grant(feature);
                        info!(feature = %feature, "Payment confirmed, entitlement granted");
                        Some(feature)
                    }
                    Some(Err(e)) => {
                        warn!("Ignoring payment success signal: {e}");
                        None
                    }
                    None => {
                        warn!("Payment success signal without a feature id");
                        None
                    }
                };
                self.persist(&entitlements);

                Reconciliation {
                    step: if granted.is_some() {
                        ReconcileStep::Granted
                    } else {
                        ReconcileStep::SuccessWithoutGrant
                    },
                    entitlements,
                    restored,
                    notice: granted.map(Notice::PaymentSucceeded),
                    clean_url: Some(strip_payment_params(url)),
                }
            }
            None if self.just_paid => {
                self.just_paid = false;
                debug!("Skipping durable entitlement load right after payment");
                Reconciliation {
                    step: ReconcileStep::GuardConsumed,
                    entitlements: current,
                    restored: None,
                    notice: None,
                    clean_url: None,
                }
            }
            None => {
                let stored = self.durable.load_entitlements();
                let entitlements = current.merge(stored.unwrap_or_default());
                if stored != Some(entitlements) {
                    self.persist(&entitlements);
                }
                Reconciliation {
                    step: ReconcileStep::LoadedDurable,
                    entitlements,
                    restored: None,
                    notice: None,
                    clean_url: None,
                }
            }
        }
    }

    fn persist(&self, entitlements: &EntitlementState) {
        if let Err(e) = self.durable.save_entitlements(entitlements) {
            warn!("Failed to persist entitlements: {e}");
        }
    }
}

/// Where the checkout provider sends the user back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutUrls {
    pub success_url: Url,
    pub cancel_url: Url,
}

/// Snapshots the on-screen analysis and builds the return URLs for `feature`.
/// Must run before leaving the page for checkout.
pub fn prepare_checkout(
    checkout: &CheckoutStore,
    analysis: Option<&ReportContract>,
    job_description: Option<&str>,
    page_url: &Url,
    feature: Feature,
) -> Result<CheckoutUrls, StorageError> {
    checkout.save_snapshot(&CheckoutSnapshot {
        analysis: analysis.cloned(),
        job_description: job_description.map(str::to_string),
    })?;

    let base = strip_payment_params(page_url);

    let mut success_url = base.clone();
    success_url
        .query_pairs_mut()
        .append_pair(PAYMENT_SUCCESS_PARAM, "true")
        .append_pair(FEATURE_PARAM, feature.id());

    let mut cancel_url = base;
    cancel_url
        .query_pairs_mut()
        .append_pair(PAYMENT_CANCELLED_PARAM, "true");

    info!(feature = %feature, "Checkout prepared");
    Ok(CheckoutUrls {
        success_url,
        cancel_url,
    })
}
