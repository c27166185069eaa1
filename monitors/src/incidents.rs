use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::HttpResult;
use engine::IncidentSink;
use errors::{Error, RepoError, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entity::monitor_incident;

pub struct IncidentRepository {
    db: Arc<DatabaseConnection>,
}

impl IncidentRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn wrap(err: sea_orm::DbErr) -> Error {
    RepoError::Query(Box::new(err)).into()
}

#[async_trait]
impl IncidentSink for IncidentRepository {
    async fn create(&self, start_time: DateTime<Utc>, result: &HttpResult) -> Result<()> {
        let row = monitor_incident::ActiveModel {
            id: Set(Uuid::now_v7()),
            monitor_id: Set(result.monitor_id),
            start_time: Set(start_time.into()),
            end_time: Set(None),
            alerted: Set(true),
            http_status: Set(result.status),
            latency_ms: Set(result.latency_ms as i32),
            created_at: Set(Utc::now().into()),
        };
        row.insert(&*self.db)
            .await
            .map_err(|e| wrap(e).with_op("repo.monitor_incident.create"))?;
        Ok(())
    }

    /// Closes the open row of a monitor. Touching zero rows returns NotFound
    /// so repeated closes are recognizably idempotent.
    async fn close_incident(&self, monitor_id: Uuid, end_time: DateTime<Utc>) -> Result<()> {
        let end_time: sea_orm::prelude::DateTimeWithTimeZone = end_time.into();
        let updated = monitor_incident::Entity::update_many()
            .col_expr(monitor_incident::Column::EndTime, Expr::value(end_time))
            .filter(monitor_incident::Column::MonitorId.eq(monitor_id))
            .filter(monitor_incident::Column::EndTime.is_null())
            .exec(&*self.db)
            .await
            .map_err(|e| wrap(e).with_op("repo.monitor_incident.close"))?;
        if updated.rows_affected == 0 {
            return Err(Error::from(RepoError::NotFound).with_op("repo.monitor_incident.close"));
        }
        Ok(())
    }
}
