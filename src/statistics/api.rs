//! Statistics from the coordinator UI stats endpoint.
//!
//! The UI API sits behind a form login. A session cookie is kept per
//! coordinator and refreshed whenever the stats endpoint answers 401.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::{redirect, StatusCode};
use std::time::Duration;
use url::Url;

use super::{ClusterStatistics, StatisticsError, StatisticsProvider};
use crate::load_balancer::backend::Coordinator;

/// User the balancer logs into the coordinator UI as.
pub const UI_USER: &str = "trinolb";

const LOGIN_PATH: &str = "/ui/login";
const MAX_ATTEMPTS: usize = 3;

/// Reads `GET {address}{path}` as a JSON [`ClusterStatistics`] document.
#[derive(Debug)]
pub struct HttpStatistics {
    client: reqwest::Client,
    path: String,
    /// Coordinator address → UI session cookie.
    cookies: DashMap<String, String>,
}

impl HttpStatistics {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Result<Self, StatisticsError> {
        // A successful login answers 303; it must not be followed.
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| StatisticsError::Client(e.to_string()))?;

        Ok(Self {
            client,
            path: path.into(),
            cookies: DashMap::new(),
        })
    }

    /// Log in to the coordinator UI and remember the session cookie.
    async fn login(&self, coordinator: &Coordinator) -> Result<(), StatisticsError> {
        let url = endpoint(&coordinator.address, LOGIN_PATH);
        let login_error = |reason: String| StatisticsError::Login {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(format!("username={}&password=&redirectPath=", UI_USER))
            .send()
            .await
            .map_err(|e| login_error(e.to_string()))?;

        if response.status() != StatusCode::SEE_OTHER {
            return Err(login_error(format!("unexpected status code {}", response.status().as_u16())));
        }

        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| login_error("no Set-Cookie header in response".to_string()))?;

        tracing::debug!(backend = %coordinator.name, "Logged in to coordinator UI");
        self.cookies
            .insert(coordinator.address.to_string(), cookie.to_string());
        Ok(())
    }
}

fn endpoint(address: &Url, path: &str) -> Url {
    let mut url = address.clone();
    url.set_path(path);
    url.set_query(None);
    url
}

#[async_trait]
impl StatisticsProvider for HttpStatistics {
    async fn statistics(&self, coordinator: &Coordinator) -> Result<ClusterStatistics, StatisticsError> {
        let url = endpoint(&coordinator.address, &self.path);
        let request_error = |source| StatisticsError::Request {
            url: url.to_string(),
            source,
        };

        for _ in 0..MAX_ATTEMPTS {
            let cookie = self
                .cookies
                .get(&coordinator.address.to_string())
                .map(|entry| entry.value().clone());

            let mut request = self.client.get(url.clone());
            if let Some(cookie) = cookie {
                request = request.header(COOKIE, cookie);
            }
            let response = request.send().await.map_err(request_error)?;

            if response.status() == StatusCode::UNAUTHORIZED {
                self.login(coordinator).await?;
                continue;
            }

            if !response.status().is_success() {
                return Err(StatisticsError::Status {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                });
            }

            return response
                .json::<ClusterStatistics>()
                .await
                .map_err(request_error);
        }

        Err(StatisticsError::Unauthorized {
            url: url.to_string(),
            attempts: MAX_ATTEMPTS,
        })
    }
}
