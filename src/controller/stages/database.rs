//! # Database Stage
//!
//! Requests the two logical databases Octavia needs on the shared MariaDB
//! instance, then runs the schema migration job against them.
//!
//! `DBReady` reports the databases and their accounts; `DBSyncReady` reports
//! the migration. The job is keyed by the stage's idempotency key, so a
//! change to any database input re-runs it.

use super::{StageContext, StageEffect, StageOutcome};
use crate::adapters::{
    AdapterResult, CleanupOutcome, DatabaseRequest, DatabaseStatus, DbSyncJob, JobStatus,
};
use crate::constants::{
    DATABASE_CR_NAME, DATABASE_NAME, PERSISTENCE_DATABASE_CR_NAME, PERSISTENCE_DATABASE_NAME,
};
use crate::controller::conditions::ConditionType;
use tracing::{debug, info};

const DB: ConditionType = ConditionType::DbReady;
const DB_SYNC: ConditionType = ConditionType::DbSyncReady;

/// Primary database first, persistence database second
#[must_use]
pub fn requests(ctx: &StageContext<'_>) -> [DatabaseRequest; 2] {
    let spec = &ctx.octavia.spec;
    [
        DatabaseRequest {
            instance: spec.database_instance.clone(),
            cr_name: DATABASE_CR_NAME.to_string(),
            database_name: DATABASE_NAME.to_string(),
            account: spec.database_account.clone(),
        },
        DatabaseRequest {
            instance: spec.database_instance.clone(),
            cr_name: PERSISTENCE_DATABASE_CR_NAME.to_string(),
            database_name: PERSISTENCE_DATABASE_NAME.to_string(),
            account: spec.persistence_database_account.clone(),
        },
    ]
}

#[must_use]
pub fn db_sync_job_name(ctx: &StageContext<'_>) -> String {
    ctx.derived_name("db-sync")
}

pub async fn execute(ctx: &StageContext<'_>, key: &str) -> StageOutcome {
    let mut outcome = StageOutcome::new();
    let databases = requests(ctx);

    let mut hostname = String::new();
    for request in &databases {
        match ctx
            .collaborators
            .database
            .ensure_database(&ctx.owner, request)
            .await
        {
            Err(e) => return outcome.failed(DB, &e),
            Ok(DatabaseStatus::Pending(message)) => {
                debug!(database = %request.cr_name, message = %message, "database.pending");
                return outcome.pending(DB, message);
            }
            Ok(DatabaseStatus::Ready { hostname: host }) => {
                if hostname.is_empty() {
                    hostname = host;
                }
            }
        }
    }
    outcome = outcome
        .ready(DB, "DB create completed")
        .effect(StageEffect::DatabaseHostname(hostname));

    let job = DbSyncJob {
        name: db_sync_job_name(ctx),
        hash: key.to_string(),
        instance: ctx.octavia.spec.database_instance.clone(),
        accounts: databases.iter().map(|r| r.account.clone()).collect(),
    };
    match ctx
        .collaborators
        .database
        .ensure_db_sync_job(&ctx.owner, &job)
        .await
    {
        Err(e) => outcome.failed(DB_SYNC, &e),
        Ok(JobStatus::Running) => outcome.pending(DB_SYNC, "DB sync job still running"),
        Ok(JobStatus::Succeeded) => {
            info!(job = %job.name, "🗄️ DB sync completed");
            outcome.ready(DB_SYNC, "DBsync completed")
        }
        Ok(JobStatus::Failed(message)) => outcome.error(DB_SYNC, message),
    }
}

pub async fn cleanup(ctx: &StageContext<'_>) -> Vec<AdapterResult<CleanupOutcome>> {
    let database = &ctx.collaborators.database;
    let mut results = vec![
        database
            .delete_db_sync_job(ctx.namespace, &db_sync_job_name(ctx))
            .await,
    ];
    for request in requests(ctx).iter().rev() {
        results.push(database.delete_database(ctx.namespace, request).await);
    }
    results
}
