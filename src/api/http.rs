//! HTTP implementation of the remote account boundary.
//!
//! One reqwest client, bearer credential on every request, 30s default
//! timeout. The backend reports operational failures either as a 2xx
//! envelope with `success:false` or as a 4xx carrying the same envelope
//! body; both are decoded into `Outcome::Rejected` here. Only a body that
//! is not an envelope at all becomes a transport error.

use reqwest::{Client, Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ApiConfig;
use crate::error::ApiError;

use super::AccountApi;
use super::types::*;

/// Production `AccountApi` over HTTP.
pub struct HttpAccountApi {
    config: ApiConfig,
    client: Client,
}

impl HttpAccountApi {
    pub fn new(config: ApiConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, client }
    }

    /// Absolute URL for an account-boundary endpoint.
    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/telegram/{}",
            self.config.base_url.as_str().trim_end_matches('/'),
            path
        )
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.endpoint(path))
            .header(
                "Authorization",
                format!("Bearer {}", self.config.auth_token.expose_secret()),
            )
            .header("Content-Type", "application/json")
    }

    /// Decode an envelope response, treating 4xx-with-envelope as a
    /// rejection rather than a transport failure.
    async fn decode_envelope<T>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<Outcome<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }

        let bytes = response.bytes().await?;
        match serde_json::from_slice::<Envelope<T>>(&bytes) {
            Ok(envelope) => Ok(envelope.into_outcome()),
            Err(parse_err) => {
                if status.is_success() {
                    Err(ApiError::Json(parse_err))
                } else {
                    Err(ApiError::UnexpectedStatus {
                        endpoint: path.to_string(),
                        status: status.as_u16(),
                    })
                }
            }
        }
    }

    async fn get_envelope<T>(&self, path: &str) -> Result<Outcome<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        let response = self.request(Method::GET, path).send().await?;
        self.decode_envelope(path, response).await
    }

    async fn post_envelope<T, B>(&self, path: &str, body: &B) -> Result<Outcome<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.request(Method::POST, path).json(body).send().await?;
        self.decode_envelope(path, response).await
    }

    async fn get_listing<T>(&self, path: &str) -> Result<Listing<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        let response = self.request(Method::GET, path).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::UnexpectedStatus {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    fn phone_path(&self, phone: &str, suffix: &str) -> String {
        format!("katka/{}/{}", urlencoding::encode(phone), suffix)
    }
}

/// `{success, data}` listing shape used by the session-record endpoints.
#[derive(Debug, serde::Deserialize)]
struct Listing<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Serialize)]
struct PhoneBody<'a> {
    phone_number: &'a str,
}

#[async_trait::async_trait]
impl AccountApi for HttpAccountApi {
    async fn check_connection(&self) -> Result<ConnectionStatus, ApiError> {
        let response = self.request(Method::GET, "check-connection").send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        Ok(response.json().await?)
    }

    async fn send_code(&self, req: SendCodeRequest) -> Result<Outcome<CodeDispatch>, ApiError> {
        self.post_envelope("send-code", &req).await
    }

    async fn send_email_code(
        &self,
        req: EmailCodeRequest,
    ) -> Result<Outcome<EmailDispatch>, ApiError> {
        self.post_envelope("send-email-code", &req).await
    }

    async fn verify_email_code(
        &self,
        req: VerifyEmailCodeRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.post_envelope("verify-email-code", &req).await
    }

    async fn verify_code(
        &self,
        req: VerifyCodeRequest,
    ) -> Result<Outcome<CodeVerification>, ApiError> {
        self.post_envelope("verify-code", &req).await
    }

    async fn verify_password(
        &self,
        req: VerifyPasswordRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.post_envelope("verify-password", &req).await
    }

    async fn reset_two_factor(&self, phone: &str) -> Result<Outcome<ResetDispatch>, ApiError> {
        self.post_envelope("reset-2fa", &PhoneBody { phone_number: phone })
            .await
    }

    async fn change_two_factor_password(
        &self,
        req: ChangeTwoFactorPasswordRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.post_envelope("change-2fa-password", &req).await
    }

    async fn sessions(&self) -> Result<Vec<SessionRecord>, ApiError> {
        let listing: Listing<Vec<SessionRecord>> = self.get_listing("sessions").await?;
        Ok(listing.data.unwrap_or_default())
    }

    async fn session(&self, id: i64) -> Result<Option<SessionRecord>, ApiError> {
        let listing: Listing<SessionRecord> = self.get_listing(&format!("sessions/{id}")).await?;
        Ok(listing.data)
    }

    async fn delete_session(&self, id: i64) -> Result<bool, ApiError> {
        let path = format!("sessions/{id}");
        let response = self.request(Method::DELETE, &path).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::UnexpectedStatus {
                endpoint: path,
                status: status.as_u16(),
            });
        }
        let listing: Listing<serde_json::Value> = response.json().await?;
        Ok(listing.success)
    }

    async fn session_history(&self, id: i64) -> Result<Vec<SessionHistoryEntry>, ApiError> {
        let listing: Listing<Vec<SessionHistoryEntry>> =
            self.get_listing(&format!("sessions/{id}/history")).await?;
        Ok(listing.data.unwrap_or_default())
    }

    async fn user_info(&self, phone: &str) -> Result<Outcome<UserProfile>, ApiError> {
        let path = format!("katka/user-info?phone_number={}", urlencoding::encode(phone));
        self.get_envelope(&path).await
    }

    async fn export_contacts(&self, phone: &str) -> Result<Outcome<ExportReceipt>, ApiError> {
        self.post_envelope("katka/export-contacts", &PhoneBody { phone_number: phone })
            .await
    }

    async fn export_chats(&self, phone: &str) -> Result<Outcome<ExportReceipt>, ApiError> {
        self.post_envelope("katka/export-chats", &PhoneBody { phone_number: phone })
            .await
    }

    async fn export_saved_messages(
        &self,
        phone: &str,
    ) -> Result<Outcome<ExportReceipt>, ApiError> {
        self.post_envelope("katka/export-saved", &PhoneBody { phone_number: phone })
            .await
    }

    async fn export_dialog(
        &self,
        phone: &str,
        peer: &str,
    ) -> Result<Outcome<ExportReceipt>, ApiError> {
        #[derive(Serialize)]
        struct Body<'a> {
            phone_number: &'a str,
            peer: &'a str,
        }
        self.post_envelope(
            "katka/export-dialog",
            &Body {
                phone_number: phone,
                peer,
            },
        )
        .await
    }

    async fn export_contact_photos(
        &self,
        phone: &str,
    ) -> Result<Outcome<ContactsExport>, ApiError> {
        self.post_envelope(
            "katka/export-contacts-photos",
            &PhoneBody { phone_number: phone },
        )
        .await
    }

    async fn fetch_avatar(&self, phone: &str) -> Result<Outcome<AvatarUpdate>, ApiError> {
        self.post_envelope("katka/avatar", &PhoneBody { phone_number: phone })
            .await
    }

    async fn scan_balance(&self, phone: &str) -> Result<Outcome<BalanceReport>, ApiError> {
        self.post_envelope("katka/balance", &PhoneBody { phone_number: phone })
            .await
    }

    async fn run_pattern_scan(&self, phone: &str) -> Result<Outcome<PatternScan>, ApiError> {
        self.post_envelope("katka/patterns", &PhoneBody { phone_number: phone })
            .await
    }

    async fn pattern_index(&self, phone: &str) -> Result<Outcome<PatternIndex>, ApiError> {
        self.get_envelope(&self.phone_path(phone, "patterns-index"))
            .await
    }

    async fn pattern_bundle(
        &self,
        phone: &str,
        chat_id: i64,
        match_id: &str,
    ) -> Result<Outcome<BundleEnvelope>, ApiError> {
        let suffix = format!(
            "patterns-bundle/{}/{}",
            chat_id,
            urlencoding::encode(match_id)
        );
        self.get_envelope(&self.phone_path(phone, &suffix)).await
    }

    async fn session_metrics(&self, phone: &str) -> Result<Outcome<MetricsSnapshot>, ApiError> {
        self.get_envelope(&self.phone_path(phone, "metrics")).await
    }

    async fn login_email_status(
        &self,
        phone: &str,
    ) -> Result<Outcome<LoginEmailStatus>, ApiError> {
        self.get_envelope(&self.phone_path(phone, "login-email-status"))
            .await
    }

    async fn last_exports(&self, phone: &str) -> Result<Outcome<LastExports>, ApiError> {
        self.get_envelope(&self.phone_path(phone, "last-exports"))
            .await
    }

    async fn check_two_factor(&self, phone: &str) -> Result<Outcome<TwoFactorStatus>, ApiError> {
        self.get_envelope(&self.phone_path(phone, "check-2fa")).await
    }

    async fn session_log(&self, phone: &str, lines: usize) -> Result<Outcome<LogTail>, ApiError> {
        let suffix = format!("session-log?lines={lines}");
        self.get_envelope(&self.phone_path(phone, &suffix)).await
    }

    async fn silence_service_notifications(
        &self,
        phone: &str,
    ) -> Result<Outcome<AutomationSummary>, ApiError> {
        self.post_envelope("katka/notifications-off", &PhoneBody { phone_number: phone })
            .await
    }

    async fn set_two_factor_email(
        &self,
        req: TwoFactorEmailRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.post_envelope("katka/set-or-update-2fa-email", &req).await
    }

    async fn change_login_email_send(
        &self,
        phone: &str,
        new_email: &str,
    ) -> Result<Outcome<Ack>, ApiError> {
        #[derive(Serialize)]
        struct Body<'a> {
            phone_number: &'a str,
            new_email: &'a str,
        }
        self.post_envelope(
            "katka/change-login-email/send",
            &Body {
                phone_number: phone,
                new_email,
            },
        )
        .await
    }

    async fn change_login_email_verify(
        &self,
        phone: &str,
        new_email: &str,
        code: &str,
    ) -> Result<Outcome<Ack>, ApiError> {
        #[derive(Serialize)]
        struct Body<'a> {
            phone_number: &'a str,
            new_email: &'a str,
            code: &'a str,
        }
        self.post_envelope(
            "katka/change-login-email/verify",
            &Body {
                phone_number: phone,
                new_email,
                code,
            },
        )
        .await
    }

    async fn auto_change_login_email(
        &self,
        phone: &str,
    ) -> Result<Outcome<EmailRotation>, ApiError> {
        self.post_envelope(
            "katka/change-login-email/auto",
            &PhoneBody { phone_number: phone },
        )
        .await
    }

    async fn terminate_other_sessions(&self, phone: &str) -> Result<Outcome<Ack>, ApiError> {
        self.post_envelope(
            "katka/terminate-other-sessions",
            &PhoneBody { phone_number: phone },
        )
        .await
    }

    async fn fetch_export_file(
        &self,
        session_id: i64,
        file_name: &str,
    ) -> Result<ArtifactFile, ApiError> {
        let path = format!("exports/{}/{}", session_id, urlencoding::encode(file_name));
        let response = self.request(Method::GET, &path).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::UnexpectedStatus {
                endpoint: path,
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let content = response.text().await?;
        Ok(ArtifactFile {
            content,
            content_type,
        })
    }
}
