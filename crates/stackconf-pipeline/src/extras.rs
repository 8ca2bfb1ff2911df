//! Optional post-registration steps: MySQL rows and Jenkins jobs.
//!
//! Every record is independent; a failure skips only that record.

use serde_json::Value;
use stackconf_clients::{JenkinsClient, MySqlInserter, MySqlTarget};
use stackconf_config::TemplateContext;
use stackconf_config::metadata::scalar_to_string;
use std::path::PathBuf;
use tracing::{error, info};

use crate::context::StackContext;
use crate::error::{PipelineError, PipelineResult};
use crate::provision::HostIdentity;

const MYSQL_RECORD_KEY: &str = "mysql.record";
const JENKINS_JOB_KEY: &str = "jenkins.job";

/// A resolved MySQL insert.
#[derive(Debug, Clone)]
pub struct MySqlInsert {
    pub target: MySqlTarget,
    pub table: String,
    pub row: Vec<(String, String)>,
}

/// A resolved Jenkins job creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JenkinsJob {
    pub host: String,
    pub user: String,
    pub password: String,
    pub name: String,
    pub template: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtrasReport {
    pub applied: usize,
    pub skipped: usize,
}

pub struct Extras<'a> {
    ctx: &'a StackContext,
    templates: TemplateContext<'a>,
}

fn entry_field<'v>(entry: &'v Value, field: &str, key: &str) -> PipelineResult<&'v str> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PipelineError::missing(&format!("{}.{}", key, field)))
}

impl<'a> Extras<'a> {
    pub fn new(ctx: &'a StackContext, host: &HostIdentity) -> Self {
        Self {
            ctx,
            templates: host.template_context(&ctx.metadata),
        }
    }

    fn setting(&self, key: &str) -> PipelineResult<String> {
        self.ctx
            .metadata
            .get_str(key)
            .ok_or_else(|| PipelineError::missing(key))
    }

    pub async fn apply(&self) -> ExtrasReport {
        let mut report = ExtrasReport::default();

        for entry in self.ctx.metadata.indexed_list(MYSQL_RECORD_KEY) {
            match self.mysql_insert(&entry).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    error!(key = MYSQL_RECORD_KEY, error = %e, "Skipping MySQL record");
                    report.skipped += 1;
                }
            }
        }

        for entry in self.ctx.metadata.indexed_list(JENKINS_JOB_KEY) {
            match self.jenkins_job(&entry).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    error!(key = JENKINS_JOB_KEY, error = %e, "Skipping Jenkins job");
                    report.skipped += 1;
                }
            }
        }

        report
    }

    /// Resolve `{uri: "db.table", template: "<key>"}` into an insert.
    pub fn plan_mysql(&self, entry: &Value) -> PipelineResult<MySqlInsert> {
        let uri = entry_field(entry, "uri", MYSQL_RECORD_KEY)?;
        let (database, table) = uri.split_once('.').ok_or_else(|| {
            stackconf_core::Error::InvalidInput(format!("mysql uri '{}' is not db.table", uri))
        })?;

        let prefix = format!("mysql.db.{}", database);
        let target = MySqlTarget {
            host: self.setting(&format!("{}.host", prefix))?,
            user: self.setting(&format!("{}.user", prefix))?,
            password: self.setting(&format!("{}.password", prefix))?,
            database: database.to_string(),
        };

        let template_key = entry_field(entry, "template", MYSQL_RECORD_KEY)?;
        let columns = self
            .ctx
            .metadata
            .get(template_key)
            .and_then(Value::as_object)
            .ok_or_else(|| PipelineError::missing(template_key))?;

        let mut row = Vec::with_capacity(columns.len());
        for (column, raw) in columns {
            let raw = scalar_to_string(raw).unwrap_or_default();
            row.push((column.clone(), self.templates.render(&raw)?));
        }

        Ok(MySqlInsert {
            target,
            table: table.to_string(),
            row,
        })
    }

    async fn mysql_insert(&self, entry: &Value) -> PipelineResult<()> {
        let insert = self.plan_mysql(entry)?;
        if self.ctx.noop {
            info!(
                noop = true,
                database = %insert.target.database,
                table = %insert.table,
                "would insert MySQL record"
            );
            return Ok(());
        }
        MySqlInserter::new(insert.target)?
            .insert(&insert.table, &insert.row)
            .await?;
        Ok(())
    }

    /// Resolve `{uri, template, name}` into a job creation.
    pub fn plan_jenkins(&self, entry: &Value) -> PipelineResult<JenkinsJob> {
        let uri = entry_field(entry, "uri", JENKINS_JOB_KEY)?;
        let prefix = format!("jenkins.host.{}", uri);
        let template = entry_field(entry, "template", JENKINS_JOB_KEY)?;
        let name = entry_field(entry, "name", JENKINS_JOB_KEY)?;

        Ok(JenkinsJob {
            host: self.setting(&format!("{}.host", prefix))?,
            user: self.setting(&format!("{}.user", prefix))?,
            password: self.setting(&format!("{}.password", prefix))?,
            name: self.templates.render(name)?,
            template: PathBuf::from(template),
        })
    }

    async fn jenkins_job(&self, entry: &Value) -> PipelineResult<()> {
        let job = self.plan_jenkins(entry)?;
        let raw = tokio::fs::read_to_string(&job.template)
            .await
            .map_err(stackconf_clients::ClientError::from)?;
        let config_xml = self.templates.render(&raw)?;

        if self.ctx.noop {
            info!(noop = true, job = %job.name, host = %job.host, "would create Jenkins job");
            return Ok(());
        }
        JenkinsClient::new(&job.host, &job.user, &job.password)?
            .create_item(&job.name, config_xml)
            .await?;
        Ok(())
    }
}
