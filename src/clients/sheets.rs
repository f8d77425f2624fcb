//! Record keeper backed by the Google Sheets v4 values API.

use std::sync::Arc;

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{RecordKeeper, SheetRow};
use crate::error::{Error, Result};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Serialize)]
struct ValueRange {
    values: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Key document in the shape Google issues for service accounts.
fn service_account_key(client_email: &str, private_key: &SecretString) -> String {
    json!({
        "type": "service_account",
        "client_email": client_email,
        "private_key": private_key.expose_secret(),
        "token_uri": TOKEN_URI,
    })
    .to_string()
}

pub struct SheetsClient {
    http: reqwest::Client,
    spreadsheet_id: String,
    sheet_name: String,
    auth: Arc<dyn TokenProvider>,
}

impl SheetsClient {
    pub fn new(
        http: reqwest::Client,
        spreadsheet_id: String,
        sheet_name: String,
        auth: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            spreadsheet_id,
            sheet_name,
            auth,
        }
    }

    /// Authenticate as a service account. Access tokens are minted from the
    /// signing key and refreshed before they expire.
    pub fn service_account(
        http: reqwest::Client,
        spreadsheet_id: String,
        sheet_name: String,
        client_email: &str,
        private_key: &SecretString,
    ) -> Result<Self> {
        let account =
            CustomServiceAccount::from_json(&service_account_key(client_email, private_key))
                .map_err(|e| Error::Config(format!("invalid Sheets service account: {e}")))?;
        Ok(Self::new(http, spreadsheet_id, sheet_name, Arc::new(account)))
    }

    async fn bearer(&self) -> Result<String> {
        let token = self
            .auth
            .token(&[SHEETS_SCOPE])
            .await
            .map_err(|e| Error::Record(format!("could not obtain access token: {e}")))?;
        Ok(token.as_str().to_string())
    }

    /// `{api}/{spreadsheet}/values/{range}{suffix}`
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url> {
        let mut url = Url::parse(SHEETS_API)
            .map_err(|e| Error::Config(format!("invalid Sheets url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| Error::Config("Sheets url cannot carry a path".to_string()))?
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }
}

#[async_trait]
impl RecordKeeper for SheetsClient {
    async fn append_row(&self, row: &SheetRow) -> Result<()> {
        let url = self.values_url(&format!("{}!A:G", self.sheet_name), ":append")?;
        let bearer = self.bearer().await?;
        let response = self
            .http
            .post(url)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(bearer)
            .json(&ValueRange {
                values: vec![row.to_values()],
            })
            .send()
            .await
            .map_err(|e| Error::Record(format!("append failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Record(format!("Sheets returned {status}: {body}")));
        }
        debug!(contact = %row.contact, "row appended");
        Ok(())
    }

    async fn list_all_rows(&self) -> Result<Vec<SheetRow>> {
        let url = self.values_url(&format!("{}!A2:G", self.sheet_name), "")?;
        let bearer = self.bearer().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| Error::Record(format!("read failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Record(format!("Sheets returned {status}: {body}")));
        }

        let values: ValuesResponse = response
            .json()
            .await
            .map_err(|e| Error::Record(format!("malformed values response: {e}")))?;

        Ok(values
            .values
            .iter()
            .map(|cells| SheetRow::from_values(cells))
            .collect())
    }
}
