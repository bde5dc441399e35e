pub mod isolation_forest;
pub mod scaler;
pub mod stats;

// Re-exports for convenience
pub use isolation_forest::IsolationForest;
pub use scaler::StandardScaler;
