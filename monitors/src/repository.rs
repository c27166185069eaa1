use std::sync::Arc;

use chrono::Utc;
use common::{CreateMonitor, Monitor};
use errors::{Error, RepoError, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::entity::monitor;

pub struct MonitorRepository {
    db: Arc<DatabaseConnection>,
}

fn wrap(err: sea_orm::DbErr) -> Error {
    RepoError::Query(Box::new(err)).into()
}

fn to_domain(model: monitor::Model) -> Monitor {
    Monitor {
        id: model.id,
        user_id: model.user_id,
        url: model.url,
        alert_email: model.alert_email,
        interval_sec: model.interval_sec,
        timeout_sec: model.timeout_sec,
        latency_threshold_ms: model.latency_threshold_ms,
        expected_status: model.expected_status,
        enabled: model.enabled,
    }
}

impl MonitorRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(&self, cmd: &CreateMonitor) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let row = monitor::ActiveModel {
            id: Set(id),
            user_id: Set(cmd.user_id),
            url: Set(cmd.url.clone()),
            alert_email: Set(cmd.alert_email.clone()),
            interval_sec: Set(cmd.interval_sec),
            timeout_sec: Set(cmd.timeout_sec),
            latency_threshold_ms: Set(cmd.latency_threshold_ms),
            expected_status: Set(cmd.expected_status),
            enabled: Set(true),
            created_at: Set(Utc::now().into()),
        };
        row.insert(&*self.db)
            .await
            .map_err(|e| wrap(e).with_op("repo.monitor.create"))?;
        Ok(id)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Monitor> {
        let model = monitor::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(|e| wrap(e).with_op("repo.monitor.get_by_id"))?;
        match model {
            Some(model) => Ok(to_domain(model)),
            None => Err(Error::from(RepoError::NotFound).with_op("repo.monitor.get_by_id")),
        }
    }

    pub async fn get_owned(&self, user_id: Uuid, id: Uuid) -> Result<Monitor> {
        let model = monitor::Entity::find_by_id(id)
            .filter(monitor::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await
            .map_err(|e| wrap(e).with_op("repo.monitor.get_owned"))?;
        match model {
            Some(model) => Ok(to_domain(model)),
            None => Err(Error::from(RepoError::NotFound).with_op("repo.monitor.get_owned")),
        }
    }

    pub async fn list(&self, user_id: Uuid, limit: u64, offset: u64) -> Result<Vec<Monitor>> {
        let models = monitor::Entity::find()
            .filter(monitor::Column::UserId.eq(user_id))
            .order_by_asc(monitor::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await
            .map_err(|e| wrap(e).with_op("repo.monitor.list"))?;
        Ok(models.into_iter().map(to_domain).collect())
    }

    pub async fn count_for_user(&self, user_id: Uuid) -> Result<u64> {
        monitor::Entity::find()
            .filter(monitor::Column::UserId.eq(user_id))
            .count(&*self.db)
            .await
            .map_err(|e| wrap(e).with_op("repo.monitor.count"))
    }

    pub async fn set_enabled(&self, user_id: Uuid, id: Uuid, enabled: bool) -> Result<()> {
        let updated = monitor::Entity::update_many()
            .col_expr(monitor::Column::Enabled, Expr::value(enabled))
            .filter(monitor::Column::Id.eq(id))
            .filter(monitor::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await
            .map_err(|e| wrap(e).with_op("repo.monitor.set_enabled"))?;
        if updated.rows_affected == 0 {
            return Err(Error::from(RepoError::NotFound).with_op("repo.monitor.set_enabled"));
        }
        Ok(())
    }
}
