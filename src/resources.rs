//! Storing and listing resources.
//!
//! Resources live in a JSON Lines file, one [`Resource`] per line.

use clap::Args;
use schemars::JsonSchema;
use uuid::Uuid;

use crate::{
    async_utils::io::{append_jsonl, read_jsonl},
    models::{Resource, ResourceSummary},
    prelude::*,
    validation::{Validate, ValidationErrors},
};

/// Default page size.
pub const DEFAULT_LIMIT: usize = 10;

/// Largest allowed page size.
pub const MAX_LIMIT: usize = 100;

/// A JSON Lines file of [`Resource`] records.
#[derive(Clone, Debug)]
pub struct ResourceStore {
    path: PathBuf,
}

impl ResourceStore {
    /// Use the resource file at `path`. It will be created on first insert.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every resource. A missing file is an empty store.
    pub async fn load_all(&self) -> Result<Vec<Resource>> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .with_context(|| format!("Failed to check for {:?}", self.path))?
        {
            return Ok(vec![]);
        }
        read_jsonl(&self.path).await
    }

    /// Add a new resource.
    pub async fn insert(&self, resource: &Resource) -> Result<()> {
        append_jsonl(&self.path, resource).await
    }

    /// Look up a resource by ID, making sure it belongs to `user_id`.
    pub async fn find(&self, user_id: &str, id: Uuid) -> Result<Resource> {
        self.load_all()
            .await?
            .into_iter()
            .find(|resource| resource.id == id && resource.user_id == user_id)
            .ok_or_else(|| anyhow!("Resource {} not found", id))
    }
}

/// Which page of results to return.
#[derive(Args, Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    /// The page to return, starting at 1.
    #[clap(long, default_value = "1", allow_negative_numbers = true)]
    #[serde(default = "default_page")]
    pub page: i64,

    /// How many resources per page, between 1 and 100.
    #[clap(long, default_value = "10", allow_negative_numbers = true)]
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT as i64
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PageQuery {
    /// Replace a zero `page` or `limit` with its default. Clients send 0 to
    /// mean "unspecified".
    pub fn normalized(&self) -> Self {
        Self {
            page: if self.page == 0 { default_page() } else { self.page },
            limit: if self.limit == 0 {
                default_limit()
            } else {
                self.limit
            },
        }
    }
}

impl Validate for PageQuery {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let query = self.normalized();
        let mut errors = ValidationErrors::default();
        errors.check(query.page < 1, "page", "Page must be greater than 0");
        errors.check(
            query.limit < 1 || query.limit > MAX_LIMIT as i64,
            "limit",
            "Limit must be between 1 and 100",
        );
        errors.into_result()
    }
}

/// One page of resource summaries.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePage {
    /// The resources on this page, newest first.
    pub data: Vec<ResourceSummary>,

    /// How many pages there are in total.
    pub total_pages: usize,

    /// The page we returned.
    pub page: usize,

    /// The page size.
    pub limit: usize,

    /// How many resources the user has in total.
    pub total_data: usize,
}

/// List `user_id`'s resources, newest first.
#[instrument(level = "debug", skip(store))]
pub async fn list_resources(
    store: &ResourceStore,
    user_id: &str,
    query: &PageQuery,
) -> Result<ResourcePage> {
    let query = query.normalized();
    query.validate()?;
    let resources = store
        .load_all()
        .await
        .context("Failed to fetch resources")?;
    Ok(paginate(resources, user_id, &query))
}

/// Select one page of `user_id`'s resources. `query` must be valid.
fn paginate(resources: Vec<Resource>, user_id: &str, query: &PageQuery) -> ResourcePage {
    let page = usize::try_from(query.page).unwrap_or(1).max(1);
    let limit = usize::try_from(query.limit).unwrap_or(DEFAULT_LIMIT).max(1);

    let mut owned = resources
        .into_iter()
        .filter(|resource| resource.user_id == user_id)
        .collect::<Vec<_>>();
    owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total_data = owned.len();
    let data = owned
        .iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .map(Resource::summary)
        .collect();
    ResourcePage {
        data,
        total_pages: total_data.div_ceil(limit),
        page,
        limit,
        total_data,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::models::CreateResourceRequest;

    fn resource(user_id: &str, title: &str, age_minutes: i64) -> Resource {
        let mut resource = Resource::new(
            user_id,
            &CreateResourceRequest {
                file_url: "https://bucket.s3.amazonaws.com/dev/resource/x.pdf".to_owned(),
                title: title.to_owned(),
            },
            vec!["page".to_owned()],
        );
        resource.created_at = Utc::now() - Duration::minutes(age_minutes);
        resource
    }

    #[test]
    fn page_queries_are_validated() {
        assert!(PageQuery::default().validate().is_ok());
        let err = PageQuery { page: -1, limit: 10 }.validate().unwrap_err();
        assert_eq!(err.to_string(), "Page must be greater than 0");
        let err = PageQuery { page: 1, limit: 101 }.validate().unwrap_err();
        assert_eq!(err.to_string(), "Limit must be between 1 and 100");
        let err = PageQuery { page: -1, limit: -5 }.validate().unwrap_err();
        assert_eq!(err.errors.len(), 2);
    }

    #[test]
    fn zero_page_and_limit_mean_the_defaults() {
        assert!(PageQuery { page: 0, limit: 10 }.validate().is_ok());
        assert!(PageQuery { page: 1, limit: 0 }.validate().is_ok());
        let query = PageQuery { page: 0, limit: 0 }.normalized();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, DEFAULT_LIMIT as i64);
    }

    #[tokio::test]
    async fn listing_with_zeros_uses_the_defaults() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("resources-test")?;
        let store = ResourceStore::new(dir.path().join("resources.jsonl"));
        for idx in 0..12 {
            store.insert(&resource("alice", &format!("r{idx}"), idx)).await?;
        }
        let page = list_resources(&store, "alice", &PageQuery { page: 0, limit: 0 }).await?;
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, DEFAULT_LIMIT);
        assert_eq!(page.data.len(), DEFAULT_LIMIT);
        assert_eq!(page.total_pages, 2);
        Ok(())
    }

    #[test]
    fn pages_are_newest_first_and_filtered_by_user() {
        let resources = vec![
            resource("alice", "old", 30),
            resource("bob", "other", 5),
            resource("alice", "new", 1),
            resource("alice", "middle", 10),
        ];
        let page = paginate(resources, "alice", &PageQuery { page: 1, limit: 2 });
        let titles = page.data.iter().map(|r| r.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, ["new", "middle"]);
        assert_eq!(page.total_data, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 2);
    }

    #[test]
    fn pages_past_the_end_are_empty() {
        let resources = vec![resource("alice", "only", 1)];
        let page = paginate(resources, "alice", &PageQuery { page: 3, limit: 10 });
        assert!(page.data.is_empty());
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.total_data, 1);
    }

    #[tokio::test]
    async fn stores_round_trip_through_jsonl() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("resources-test")?;
        let store = ResourceStore::new(dir.path().join("resources.jsonl"));
        assert!(store.load_all().await?.is_empty());

        let first = resource("alice", "first", 2);
        let second = resource("bob", "second", 1);
        store.insert(&first).await?;
        store.insert(&second).await?;

        assert_eq!(store.load_all().await?, vec![first.clone(), second.clone()]);
        assert_eq!(store.find("alice", first.id).await?, first);
        assert!(store.find("alice", second.id).await.is_err());

        let page = list_resources(&store, "bob", &PageQuery::default()).await?;
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, second.id);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_queries_do_not_read_the_store() {
        let store = ResourceStore::new("/nonexistent/dir/resources.jsonl");
        let err = list_resources(&store, "alice", &PageQuery { page: 0, limit: 10 })
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ValidationErrors>().is_some());
    }
}
