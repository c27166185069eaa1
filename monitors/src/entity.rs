pub mod monitor {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
    #[sea_orm(table_name = "monitors")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub user_id: Uuid,
        pub url: String,
        pub alert_email: String,
        pub interval_sec: i32,
        pub timeout_sec: i32,
        pub latency_threshold_ms: i32,
        pub expected_status: i32,
        pub enabled: bool,
        pub created_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod monitor_incident {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    /// At most one open row (end_time null) per monitor at any instant.
    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
    #[sea_orm(table_name = "monitor_incidents")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub monitor_id: Uuid,
        pub start_time: DateTimeWithTimeZone,
        pub end_time: Option<DateTimeWithTimeZone>,
        pub alerted: bool,
        pub http_status: i32,
        pub latency_ms: i32,
        pub created_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
