//! Vestibule: a single sign-on session coordinator.
//!
//! One authenticated identity is shared across multiple applications
//! behind a common front door. Each application keeps its own session
//! with its own idle timeout; a shared SSO record stays alive as long
//! as *any* bound application shows activity; two independent
//! background sweeps reclaim idle sessions and inactive records.
//!
//! The HTTP dispatcher, the login form, and the credential store are
//! external collaborators: the dispatcher drives [`gate::RequestGate`]
//! and [`coordinator::AuthenticationCoordinator`], and credential
//! verification is the injected [`coordinator::CredentialVerifier`]
//! capability.

pub mod clock;
pub mod context;
pub mod coordinator;
pub mod gate;
pub mod reaper;
pub mod session_store;
pub mod sso_registry;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::AppContext;
pub use coordinator::{AuthenticationCoordinator, CredentialVerifier};
pub use gate::{AuthDecision, RequestGate};
pub use reaper::ReaperScheduler;
pub use session_store::{AppSession, SessionStore};
pub use sso_registry::{SsoRecord, SsoRegistry};
pub use types::{AppId, Principal, SessionId, SsoId};

pub use vestibule_config::Config;
pub use vestibule_error::{AppError, AppResult};
