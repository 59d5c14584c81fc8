//! Session & Access Substrate (spec.md §4.8): bearer-token sessions, the CSRF
//! double-submit cookie, LNURL-auth, and request-boundary rate limiting.
//! Grounded on the teacher's `forgot_password_challenges:
//! Arc<RwLock<HashMap<String, (String, Instant)>>>` ephemeral-token field
//! (`startup.rs`), generalized onto `infra::cache::Cache` instead of a
//! bespoke map.

pub mod csrf;
pub mod lnurl;
pub mod rate_limit;
pub mod store;

pub use csrf::CsrfGuard;
pub use lnurl::{LnurlAuth, LnurlChallengeView};
pub use rate_limit::RateLimiter;
pub use store::{Session, SessionStore};
