//! `SeaORM` implementation of the `IncidentService` trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

use crate::constants::limits;
use crate::db::{IncidentChanges, IncidentFilter, NewIncident, Store};
use crate::domain::{
    Action, Actor, AuditAction, IncidentStatus, Resource, TargetType, validation,
};
use crate::entities::incident_categories;
use crate::services::audit::AuditRecorder;
use crate::services::incident_service::{
    DashboardData, Incident, IncidentError, IncidentInput, IncidentPage, IncidentPatch,
    IncidentQuery, IncidentService,
};
use crate::services::notifier::{self, Notification, Notifier};
use crate::services::{policy, sanitizer};

pub struct SeaOrmIncidentService {
    store: Store,
    audit: AuditRecorder,
    notifier: Arc<dyn Notifier>,
}

impl SeaOrmIncidentService {
    #[must_use]
    pub fn new(store: Store, audit: AuditRecorder, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            audit,
            notifier,
        }
    }

    async fn ensure_category(
        &self,
        category_id: i32,
    ) -> Result<incident_categories::Model, IncidentError> {
        self.store
            .category_repo()
            .get_by_id(category_id)
            .await?
            .ok_or_else(|| IncidentError::Validation("Invalid category selected".to_string()))
    }

    fn clean_description(raw: &str) -> Result<String, IncidentError> {
        let description = validation::validate_incident_description(raw)?;
        Ok(sanitizer::clean_html(&description))
    }

    /// Emails every admin about an incident change. Failures are logged only.
    async fn notify_admins(&self, incident: &Incident, verb: &str) {
        let recipients = match self.store.user_repo().list_admins().await {
            Ok(admins) => admins.into_iter().map(|a| a.email).collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(error = ?e, incident_id = incident.id, "Could not load admins for notification");
                return;
            }
        };

        let notification = Notification {
            subject: format!("Incident #{} {verb}", incident.id),
            recipients,
            html_body: format!(
                "<p>Incident <strong>#{id}</strong> was {action}.</p><ul><li>Title: {title}</li><li>Status: {status}</li><li>Category: {category}</li></ul>",
                id = incident.id,
                action = verb.to_lowercase(),
                title = html_escape::encode_text(&incident.title),
                status = incident.status,
                category = html_escape::encode_text(
                    incident.category_name.as_deref().unwrap_or("-")
                ),
            ),
        };

        notifier::deliver(self.notifier.as_ref(), notification).await;
    }
}

fn parse_status(raw: Option<&str>) -> Result<Option<IncidentStatus>, IncidentError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<IncidentStatus>)
        .transpose()
        .map_err(|_| {
            IncidentError::Validation(
                "Status must be one of: Open, In Progress, Closed".to_string(),
            )
        })
}

/// `closed_at` is stamped when an incident becomes Closed and cleared when it
/// leaves Closed.
fn next_closed_at(
    status: IncidentStatus,
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if status.is_closed() {
        current.or(Some(now))
    } else {
        None
    }
}

fn summarize(
    status_counts: Vec<(String, i64)>,
    category_counts: Vec<(String, i64)>,
    timestamps: &[DateTime<Utc>],
    spans: &[(DateTime<Utc>, DateTime<Utc>)],
) -> DashboardData {
    let mut data = DashboardData::default();

    let mut by_status: HashMap<String, i64> = status_counts.into_iter().collect();
    for status in IncidentStatus::ALL {
        if let Some(count) = by_status.remove(status.as_str()) {
            data.statuses.push(status.to_string());
            data.status_counts.push(count);
        }
    }

    let mut daily: BTreeMap<String, i64> = BTreeMap::new();
    for ts in timestamps {
        *daily.entry(ts.format("%Y-%m-%d").to_string()).or_default() += 1;
    }
    for (date, count) in daily {
        data.dates.push(date);
        data.daily_counts.push(count);
    }

    let mut categories = category_counts;
    categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (name, count) in categories.into_iter().take(limits::DASHBOARD_TOP_CATEGORIES) {
        data.cat_names.push(name);
        data.cat_counts.push(count);
    }

    if !spans.is_empty() {
        let total_seconds: i64 = spans
            .iter()
            .map(|(opened, closed)| (*closed - *opened).num_seconds())
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let hours = total_seconds as f64 / spans.len() as f64 / 3600.0;
        data.avg_hours = (hours * 100.0).round() / 100.0;
    }

    data
}

#[async_trait]
impl IncidentService for SeaOrmIncidentService {
    async fn list(&self, query: IncidentQuery) -> Result<IncidentPage, IncidentError> {
        let filter = IncidentFilter {
            query: query.q,
            status: parse_status(query.status.as_deref())?,
            // An unparsable category filter is ignored
            category_id: query
                .category
                .as_deref()
                .and_then(|c| c.trim().parse::<i32>().ok()),
        };

        let page = query.page.unwrap_or(1).max(1);
        let per_page = limits::INCIDENTS_PER_PAGE;

        let (rows, total, pages) = self
            .store
            .incident_repo()
            .list(&filter, page, per_page)
            .await?;

        Ok(IncidentPage {
            items: rows.into_iter().map(Incident::from).collect(),
            page,
            per_page,
            total,
            pages,
        })
    }

    async fn get(&self, id: i32) -> Result<Incident, IncidentError> {
        self.store
            .incident_repo()
            .get_by_id(id)
            .await?
            .map(Incident::from)
            .ok_or(IncidentError::NotFound(id))
    }

    async fn create(
        &self,
        actor: &Actor,
        input: IncidentInput,
    ) -> Result<Incident, IncidentError> {
        let resource = Resource::Incident {
            creator_id: Some(actor.id),
        };
        if !policy::authorize(actor, Action::Create, resource) {
            return Err(IncidentError::Forbidden);
        }

        let title = validation::validate_incident_title(&input.title)?;
        let description = Self::clean_description(&input.description)?;
        let status = parse_status(input.status.as_deref())?.unwrap_or_default();
        let category = self.ensure_category(input.category_id).await?;

        let created = self
            .store
            .incident_repo()
            .create(NewIncident {
                title,
                description,
                status,
                category_id: input.category_id,
                user_id: actor.id,
            })
            .await?;

        info!(user_id = actor.id, incident_id = created.id, "Incident created");
        self.audit
            .record(
                AuditAction::Create,
                TargetType::Incident,
                Some(created.id),
                Some(actor.id),
            )
            .await;

        // Built from the committed row; a re-read could fail after the fact
        let incident = Incident::from((created, Some(category)));
        self.notify_admins(&incident, "Created").await;
        Ok(incident)
    }

    async fn update(
        &self,
        actor: &Actor,
        id: i32,
        patch: IncidentPatch,
    ) -> Result<Incident, IncidentError> {
        let (existing, existing_category) = self
            .store
            .incident_repo()
            .get_by_id(id)
            .await?
            .ok_or(IncidentError::NotFound(id))?;

        let resource = Resource::Incident {
            creator_id: Some(existing.user_id),
        };
        if !policy::authorize(actor, Action::Update, resource) {
            return Err(IncidentError::Forbidden);
        }

        let title = match patch.title.as_deref() {
            Some(raw) => validation::validate_incident_title(raw)?,
            None => existing.title.clone(),
        };
        let description = match patch.description.as_deref() {
            Some(raw) => Self::clean_description(raw)?,
            None => existing.description.clone(),
        };
        let status = match parse_status(patch.status.as_deref())? {
            Some(status) => status,
            None => existing.status.parse().unwrap_or_default(),
        };
        let category = match patch.category_id {
            Some(category_id) => Some(self.ensure_category(category_id).await?),
            None => existing_category,
        };
        let category_id = patch.category_id.unwrap_or(existing.category_id);
        let closed_at = next_closed_at(status, existing.closed_at, Utc::now());

        let updated = self
            .store
            .incident_repo()
            .update(
                existing,
                IncidentChanges {
                    title,
                    description,
                    status,
                    category_id,
                    closed_at,
                },
            )
            .await?;

        info!(user_id = actor.id, incident_id = id, status = %status, "Incident updated");
        self.audit
            .record(
                AuditAction::Update,
                TargetType::Incident,
                Some(id),
                Some(actor.id),
            )
            .await;

        let incident = Incident::from((updated, category));
        self.notify_admins(&incident, "Updated").await;
        Ok(incident)
    }

    async fn delete(&self, actor: &Actor, id: i32) -> Result<(), IncidentError> {
        if !policy::authorize(actor, Action::Delete, Resource::Incident { creator_id: None }) {
            return Err(IncidentError::Forbidden);
        }

        let incident = self.get(id).await?;

        if !self.store.incident_repo().delete(id).await? {
            return Err(IncidentError::NotFound(id));
        }

        info!(user_id = actor.id, incident_id = id, "Incident deleted");
        self.audit
            .record(
                AuditAction::Delete,
                TargetType::Incident,
                Some(id),
                Some(actor.id),
            )
            .await;

        self.notify_admins(&incident, "Deleted").await;
        Ok(())
    }

    async fn dashboard(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<DashboardData, IncidentError> {
        if !policy::authorize(actor, Action::Read, Resource::Dashboard) {
            return Err(IncidentError::Forbidden);
        }

        let repo = self.store.incident_repo();
        let status_counts = repo.count_by_status().await?;
        let timestamps = repo
            .timestamps_since(now - Duration::days(limits::DASHBOARD_DAYS))
            .await?;
        let spans = repo.resolution_spans().await?;

        let names: HashMap<i32, String> = self
            .store
            .category_repo()
            .list()
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();
        let category_counts = repo
            .count_by_category()
            .await?
            .into_iter()
            .filter_map(|(id, count)| names.get(&id).map(|name| (name.clone(), count)))
            .collect();

        Ok(summarize(status_counts, category_counts, &timestamps, &spans))
    }
}
