//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories:
//! - Implementing business rules and validation
//! - Coordinating repositories, the cache and outbound HTTP clients
//! - Degrading to fallbacks when an external service fails

pub mod auth;
pub mod chat;
pub mod email;
pub mod import;
pub mod instagram;
pub mod lead;
pub mod listing;
pub mod llm;
pub mod password;
pub mod rate_limiter;
pub mod search;

pub use auth::{AuthError, AuthService, IssuedSession};
pub use chat::{ChatAgent, ChatError, ChatRequest, ChatResponse, Intent};
pub use email::{create_mailer, Mailer, Notifier};
pub use import::{ImportService, ImportServiceError};
pub use instagram::{Feed, FeedSource, InstagramService, Post};
pub use lead::{LeadService, LeadServiceError};
pub use listing::{ListingService, ListingServiceError};
pub use llm::{ChatMessage, ChatModel, GeminiClient, LlmError};
pub use password::{hash_password, resolve_admin_password, verify_password};
pub use rate_limiter::RateLimiter;
pub use search::{SearchCriteria, SearchOutcome, SearchService};
