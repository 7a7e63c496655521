// Test modules for resilience-core
//
// Each source module has a corresponding test file that focuses on
// business logic verification.

// Test helper utilities
pub mod helpers;

pub mod config;
pub mod retry;
