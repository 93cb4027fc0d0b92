//! # Resilience Module
//!
//! Fault tolerance for unreliable downstream dependencies. One
//! [`CircuitBreaker`] guards one logical dependency and is shared by every
//! concurrent caller of it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roster_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     timeout: Duration::from_secs(60),
//! };
//!
//! let circuit_breaker = CircuitBreaker::new("member_fetch", config);
//!
//! let result = circuit_breaker.call(|| async {
//!     Ok::<&str, std::io::Error>("members")
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::CircuitBreakerConfig;
pub use metrics::CircuitBreakerMetrics;
