pub mod error;
pub mod rate_limit;
pub mod security;
pub mod sessions;

pub use error::{GuardrailError, GuardrailErrorKind};
pub use rate_limit::{RateLimitConfig, SlidingWindowRateLimiter};
pub use security::{
    ContentFilterConfig, FilteredContent, SecurityConfig, SecurityManager, UserValidationConfig,
    content_flags_metadata, sanitize_input,
};
pub use sessions::{
    DenyAllVerifier, SessionManager, SessionStats, SessionStatus, StaticTokenVerifier,
    TokenVerifier, TrustedToken, UserSession, VerifiedToken,
};
