// MemberPress REST API client

pub mod client;
pub mod models;

// Re-export common types
pub use client::{ApiError, ApiResponse, Credentials, MemberPressClient, Page, CACHE_TTL};
pub use models::{parse_timestamp, Member, MemberRef, Subscription, Transaction};

pub type Result<T> = std::result::Result<T, ApiError>;
