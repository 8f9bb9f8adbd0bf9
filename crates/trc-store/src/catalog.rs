//! Projects, plans, and API keys.

use crate::{Store, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use trc_core::{Plan, Project};
use uuid::Uuid;

/// Identity resolved from a bearer API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyIdentity {
    /// Owning organization.
    pub org_id: String,
    /// Acting user.
    pub user_id: String,
    /// Billing plan id, e.g. `dev`.
    pub billing_plan: String,
}

impl Store {
    // -- Projects ------------------------------------------------------------

    /// Idempotent project registration keyed by `repo_root_hash`.
    ///
    /// Returns the existing project when the hash is already registered.
    pub async fn connect_project(
        &self,
        repo_name: &str,
        repo_root_hash: &str,
    ) -> Result<Project, StoreError> {
        let repo_name = repo_name.to_string();
        let repo_root_hash = repo_root_hash.to_string();
        self.with_conn(move |conn| {
            if let Some(existing) = conn
                .query_row(
                    "SELECT id, repo_name, repo_root_hash, created_at
                     FROM projects WHERE repo_root_hash = ?1",
                    params![repo_root_hash],
                    project_from_row,
                )
                .optional()?
            {
                return Ok(existing);
            }

            let project = Project {
                id: Uuid::new_v4(),
                repo_name: repo_name.clone(),
                repo_root_hash: repo_root_hash.clone(),
                created_at: Utc::now(),
            };
            conn.execute(
                "INSERT INTO projects (id, repo_name, repo_root_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    project.id.to_string(),
                    project.repo_name,
                    project.repo_root_hash,
                    project.created_at.timestamp_micros(),
                ],
            )?;
            Ok(project)
        })
        .await
    }

    /// Fetch a project by id.
    pub async fn project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, repo_name, repo_root_hash, created_at FROM projects WHERE id = ?1",
                    params![id.to_string()],
                    project_from_row,
                )
                .optional()?)
        })
        .await
    }

    // -- Plans ---------------------------------------------------------------

    /// Insert a new plan.
    pub async fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let document = serde_json::to_string(plan)?;
        let plan = plan.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO plans (id, project_id, created_at, approved_at, document)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    plan.id.to_string(),
                    plan.project_id.to_string(),
                    plan.created_at.timestamp_micros(),
                    plan.approved_at.map(|t| t.timestamp_micros()),
                    document,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Persist a plan's one-time approval.
    pub async fn update_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let document = serde_json::to_string(plan)?;
        let plan = plan.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE plans SET approved_at = ?2, document = ?3 WHERE id = ?1",
                params![
                    plan.id.to_string(),
                    plan.approved_at.map(|t| t.timestamp_micros()),
                    document,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("plan"));
            }
            Ok(())
        })
        .await
    }

    /// Fetch a plan by id.
    pub async fn plan(&self, id: Uuid) -> Result<Option<Plan>, StoreError> {
        self.with_conn(move |conn| {
            let document: Option<String> = conn
                .query_row(
                    "SELECT document FROM plans WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            document
                .map(|d| serde_json::from_str(&d).map_err(StoreError::Serde))
                .transpose()
        })
        .await
    }

    /// The most recently created plan for a project.
    pub async fn latest_plan(&self, project_id: Uuid) -> Result<Option<Plan>, StoreError> {
        self.plan_query(
            project_id,
            "SELECT document FROM plans WHERE project_id = ?1
             ORDER BY created_at DESC LIMIT 1",
        )
        .await
    }

    /// The most recently approved plan for a project.
    pub async fn approved_plan(&self, project_id: Uuid) -> Result<Option<Plan>, StoreError> {
        self.plan_query(
            project_id,
            "SELECT document FROM plans WHERE project_id = ?1 AND approved_at IS NOT NULL
             ORDER BY approved_at DESC LIMIT 1",
        )
        .await
    }

    async fn plan_query(
        &self,
        project_id: Uuid,
        sql: &'static str,
    ) -> Result<Option<Plan>, StoreError> {
        self.with_conn(move |conn| {
            let document: Option<String> = conn
                .query_row(sql, params![project_id.to_string()], |row| row.get(0))
                .optional()?;
            document
                .map(|d| serde_json::from_str(&d).map_err(StoreError::Serde))
                .transpose()
        })
        .await
    }

    // -- API keys ------------------------------------------------------------

    /// Register an API key.
    pub async fn create_api_key(
        &self,
        token: &str,
        identity: &ApiKeyIdentity,
    ) -> Result<(), StoreError> {
        let token = token.to_string();
        let identity = identity.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO api_keys (token, org_id, user_id, billing_plan)
                 VALUES (?1, ?2, ?3, ?4)",
                params![token, identity.org_id, identity.user_id, identity.billing_plan],
            )?;
            Ok(())
        })
        .await
    }

    /// Resolve a bearer token to its identity.
    pub async fn resolve_api_key(
        &self,
        token: &str,
    ) -> Result<Option<ApiKeyIdentity>, StoreError> {
        let token = token.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT org_id, user_id, billing_plan FROM api_keys WHERE token = ?1",
                    params![token],
                    |row| {
                        Ok(ApiKeyIdentity {
                            org_id: row.get(0)?,
                            user_id: row.get(1)?,
                            billing_plan: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }
}

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let id: String = row.get(0)?;
    let created_at: i64 = row.get(3)?;
    Ok(Project {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        repo_name: row.get(1)?,
        repo_root_hash: row.get(2)?,
        created_at: DateTime::<Utc>::from_timestamp_micros(created_at).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trc_core::{InputRecord, TasksDocument};

    fn plan_for(project_id: Uuid) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            project_id,
            created_at: Utc::now(),
            approved_at: None,
            approved_repo_commit: None,
            artifacts_manifest: vec![],
            tasks_document: TasksDocument::default(),
            input_record: InputRecord::default(),
        }
    }

    #[tokio::test]
    async fn connect_project_is_idempotent_by_hash() {
        let store = Store::open_in_memory().await.unwrap();
        let a = store.connect_project("trcoder", "DEV").await.unwrap();
        let b = store.connect_project("renamed", "DEV").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.repo_name, "trcoder");

        let c = store.connect_project("other", "OTHER").await.unwrap();
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn plan_lifecycle_latest_and_approved() {
        let store = Store::open_in_memory().await.unwrap();
        let project = store.connect_project("trcoder", "DEV").await.unwrap();

        let mut first = plan_for(project.id);
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        store.insert_plan(&first).await.unwrap();

        let mut second = plan_for(project.id);
        store.insert_plan(&second).await.unwrap();

        let latest = store.latest_plan(project.id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert!(store.approved_plan(project.id).await.unwrap().is_none());

        second.approve("DEV").unwrap();
        store.update_plan(&second).await.unwrap();

        let approved = store.approved_plan(project.id).await.unwrap().unwrap();
        assert_eq!(approved.id, second.id);
        assert_eq!(approved.approved_repo_commit.as_deref(), Some("DEV"));
    }

    #[tokio::test]
    async fn update_missing_plan_is_not_found() {
        let store = Store::open_in_memory().await.unwrap();
        let plan = plan_for(Uuid::new_v4());
        assert!(matches!(
            store.update_plan(&plan).await,
            Err(StoreError::NotFound("plan"))
        ));
    }

    #[tokio::test]
    async fn api_key_resolution() {
        let store = Store::open_in_memory().await.unwrap();
        let identity = ApiKeyIdentity {
            org_id: "org-1".into(),
            user_id: "user-1".into(),
            billing_plan: "dev".into(),
        };
        store.create_api_key("sk-local-test", &identity).await.unwrap();

        let resolved = store.resolve_api_key("sk-local-test").await.unwrap();
        assert_eq!(resolved, Some(identity));
        assert!(store.resolve_api_key("sk-wrong").await.unwrap().is_none());
    }
}
