pub mod config;
pub mod credentials;
pub mod error;
pub mod onboarding;
pub mod readiness;
pub mod report;
pub mod runner;
