//! Monitor CRUD collaborator: sea-orm persistence, the read-through cache
//! service the pipeline loads monitors from, and the durable incident rows.

pub mod entity;
pub mod incidents;
pub mod repository;
pub mod service;

pub use incidents::IncidentRepository;
pub use repository::MonitorRepository;
pub use service::MonitorRegistry;
