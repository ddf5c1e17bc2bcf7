//! Client-held core of CVLens: the analysis state machine, entitlement
//! reconciliation across checkout redirects, the paywall, and the two
//! browser-storage areas they persist to.

pub mod analysis_state;
pub mod entitlements;
pub mod reconciler;
pub mod session;
pub mod storage;

pub use analysis_state::{
    AnalysisApi, AnalysisMachine, AnalysisPhase, AnalysisSubmission, ApiResponse, HttpAnalysisApi,
    TransportError,
};
pub use entitlements::{can_access, EntitlementState, Feature, UnknownFeature};
pub use reconciler::{
    prepare_checkout, CheckoutUrls, Notice, PaymentSignal, ReconcileStep, Reconciler,
    Reconciliation,
};
pub use session::{FeatureAccess, PageSession};
pub use storage::{
    clear_all, CheckoutSnapshot, CheckoutStore, DurableStore, KeyValueStore, MemoryStorage,
    StorageError,
};
