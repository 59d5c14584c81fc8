pub mod cache;
pub mod db;
pub mod lightning;
pub mod oracle;

// Mock implementations only available with e2e-testing feature or debug builds
#[cfg(any(feature = "e2e-testing", debug_assertions))]
pub mod lightning_mock;
#[cfg(any(feature = "e2e-testing", debug_assertions))]
pub mod oracle_mock;
