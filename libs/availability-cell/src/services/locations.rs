use anyhow::Result;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::Location;

/// The set of locations one booking request is matched against, plus the
/// state's hub city when one is configured. Hub-restricted therapists stay
/// eligible for every member of their state's group.
#[derive(Debug, Clone)]
pub struct LocationGroup {
    pub locations: Vec<Location>,
    pub hub: Option<Location>,
}

impl LocationGroup {
    pub fn single(location: Location) -> Self {
        Self {
            locations: vec![location],
            hub: None,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .locations
            .iter()
            .map(|location| location.name.as_str())
            .collect();
        if let Some(hub) = &self.hub {
            if !names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&hub.name))
            {
                names.push(hub.name.as_str());
            }
        }
        names
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names()
            .iter()
            .any(|member| member.eq_ignore_ascii_case(name))
    }

    pub fn hub_name(&self) -> Option<&str> {
        self.hub.as_ref().map(|hub| hub.name.as_str())
    }
}

/// Resolves a requested location into its group. Hub cities come from
/// configuration (`HUB_CITIES`), so adding a new exception is a config change
/// rather than a code change.
pub struct LocationGroupResolver {
    supabase: SupabaseClient,
    hub_cities: Vec<String>,
}

impl LocationGroupResolver {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            hub_cities: config.hub_cities.clone(),
        }
    }

    fn is_hub(&self, name: &str) -> bool {
        self.hub_cities
            .iter()
            .any(|hub| hub.eq_ignore_ascii_case(name))
    }

    pub async fn resolve(
        &self,
        location: &Location,
        auth_token: Option<&str>,
    ) -> Result<LocationGroup> {
        if self.is_hub(&location.name) {
            // A hub city booking draws on the whole state.
            let path = format!(
                "/rest/v1/locations?state=eq.{}&order=name.asc",
                location.state
            );
            let mut siblings: Vec<Location> =
                self.supabase.fetch_rows_lenient(&path, auth_token).await?;
            if !siblings.iter().any(|sibling| sibling.id == location.id) {
                siblings.push(location.clone());
            }
            debug!(
                "Expanded hub {} to {} locations in {}",
                location.name,
                siblings.len(),
                location.state
            );
            return Ok(LocationGroup {
                hub: Some(location.clone()),
                locations: siblings,
            });
        }

        if self.hub_cities.is_empty() {
            return Ok(LocationGroup::single(location.clone()));
        }

        // A non-hub booking still honors the state's hub, if it has one, so
        // hub-restricted therapists remain eligible here.
        let quoted: Vec<String> = self
            .hub_cities
            .iter()
            .map(|city| format!("\"{}\"", city))
            .collect();
        let path = format!(
            "/rest/v1/locations?state=eq.{}&name=in.({})",
            location.state,
            quoted.join(",")
        );
        let hubs: Vec<Location> = self.supabase.fetch_rows_lenient(&path, auth_token).await?;

        Ok(LocationGroup {
            locations: vec![location.clone()],
            hub: hubs.into_iter().next(),
        })
    }
}
