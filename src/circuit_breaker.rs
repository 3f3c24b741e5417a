use failsafe::{backoff, failure_policy, Config};
use std::time::Duration;

/// Creates the circuit breaker guarding calls to the analysis software.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, requests pass through.
/// - **OPEN**: Too many failures, requests fail fast and are recorded as
///   processing errors without contacting the service.
/// - **HALF_OPEN**: Testing if service recovered.
pub fn create_analysis_circuit_breaker() -> impl failsafe::CircuitBreaker + Send + Sync {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
