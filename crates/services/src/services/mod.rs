pub mod approvals;
pub mod bulk_email;
pub mod config;
pub mod csv_export;
pub mod duplicate_detector;
pub mod email;
pub mod notification;
pub mod pipeline;
pub mod rate_limiter;
pub mod scoring;
pub mod stage_registry;

#[cfg(test)]
pub(crate) mod test_support;
