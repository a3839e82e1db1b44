pub mod application;
pub mod approval;
pub mod candidate;
pub mod job;
pub mod member;
pub mod notification;
pub mod organization;
pub mod scorecard;
pub mod stage_event;
