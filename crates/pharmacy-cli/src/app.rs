//! Application state for the command-line front-end.
//!
//! `App` wires the config, session store and gateway together, restores the
//! previous session at startup and watches the session for changes while a
//! command runs.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use pharmacy_core::models::{PrescriptionRequest, UserProfileUpdate};
use pharmacy_core::{
    ApiClient, Config, Gateway, IdentityFetch, IdentityOutcome, SessionStore, LOGIN_ROUTE,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::format::{format_date, format_optional, format_phone, truncate_string};
use crate::navigator::CliNavigator;

/// Width of the description column in drug listings
const DESCRIPTION_WIDTH: usize = 40;

pub struct App {
    pub config: Config,
    gateway: Gateway,
    session: Arc<SessionStore>,
    navigator: Arc<CliNavigator>,
    pending_identity: Option<IdentityFetch>,
    watcher: JoinHandle<()>,
}

impl App {
    /// Build the gateway and restore any stored session.
    pub fn new(config: Config) -> Result<Self> {
        let api = ApiClient::with_timeout(&config.api_base_url, config.request_timeout())
            .context("Failed to create API client")?;
        let storage = config.token_storage()?;
        let session = SessionStore::new(storage, Arc::new(api.clone()));
        let navigator = Arc::new(CliNavigator::default());
        let gateway = Gateway::new(api, session.clone(), navigator.clone());

        let pending_identity = match session.rehydrate() {
            Ok(fetch) => fetch,
            Err(e) => {
                warn!(error = %e, "Could not read stored session");
                None
            }
        };

        let watcher = Self::watch_session(&session);

        Ok(Self {
            config,
            gateway,
            session,
            navigator,
            pending_identity,
            watcher,
        })
    }

    fn watch_session(session: &SessionStore) -> JoinHandle<()> {
        let mut subscription = session.subscribe();
        tokio::spawn(async move {
            while let Some(current) = subscription.changed().await {
                debug!(
                    authenticated = current.is_authenticated(),
                    user = ?current.user.as_ref().map(|u| u.id),
                    "Session changed"
                );
            }
        })
    }

    /// Wait for the restored session's identity so authenticated commands
    /// never run with a token the server already rejected.
    async fn ready(&mut self) -> Result<()> {
        if let Some(fetch) = self.pending_identity.take() {
            if let IdentityOutcome::RolledBack = fetch.settled().await {
                info!("Stored session is no longer valid");
            }
        }
        if !self.session.is_authenticated() {
            anyhow::bail!("Not logged in. Run `pharmacy login` first.");
        }
        Ok(())
    }

    /// True if a response ended the session during this command.
    pub fn was_evicted(&self) -> bool {
        self.navigator.redirected()
    }

    /// Stop watching the session. Drops the subscription.
    pub fn shutdown(self) {
        self.watcher.abort();
    }

    fn prompt(label: &str, default: Option<&str>) -> Result<String> {
        match default {
            Some(d) => print!("{} [{}]: ", label, d),
            None => print!("{}: ", label),
        }
        io::stdout().flush()?;

        let mut value = String::new();
        io::stdin().read_line(&mut value)?;
        let value = value.trim();
        if value.is_empty() {
            if let Some(d) = default {
                return Ok(d.to_string());
            }
        }
        Ok(value.to_string())
    }

    fn prompt_password(label: &str) -> Result<String> {
        let password = rpassword::prompt_password(format!("{}: ", label))?;
        Ok(password)
    }

    // ===== Authentication =====

    pub async fn login(&mut self, email: Option<String>) -> Result<()> {
        let email = match email {
            Some(email) => email,
            None => Self::prompt("Email", self.config.last_email.as_deref())?,
        };
        let password = Self::prompt_password("Password")?;

        // A new login supersedes whatever was restored
        self.pending_identity = None;
        let logged_in = self.gateway.login(&email, &password).await?;

        match logged_in.identity.settled().await {
            IdentityOutcome::Populated(user) => {
                println!("Logged in as {} ({})", user.email, user.role);
            }
            _ => anyhow::bail!("Login succeeded but the profile could not be loaded"),
        }

        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        Ok(())
    }

    pub fn logout(&mut self) -> Result<()> {
        self.pending_identity = None;
        self.gateway.logout()?;
        println!("Logged out");
        Ok(())
    }

    pub async fn register(&mut self, email: Option<String>) -> Result<()> {
        let email = match email {
            Some(email) => email,
            None => Self::prompt("Email", None)?,
        };
        let password = Self::prompt_password("Password")?;
        let confirm = Self::prompt_password("Confirm password")?;
        if password != confirm {
            anyhow::bail!("Passwords do not match");
        }

        let registered = self.gateway.register(&email, &password).await?;
        println!(
            "Registered {} (id {}, role {}) on {}",
            registered.email,
            registered.id,
            registered.role,
            format_date(&registered.registered_at)
        );
        println!("Run `pharmacy login` to sign in.");
        Ok(())
    }

    pub async fn request_password_reset(&mut self, email: String) -> Result<()> {
        let response = self.gateway.request_password_reset(&email).await?;
        println!("{}", response.message);
        Ok(())
    }

    pub async fn confirm_password_reset(&mut self, token: String) -> Result<()> {
        let new_password = Self::prompt_password("New password")?;
        let response = self
            .gateway
            .confirm_password_reset(&token, &new_password)
            .await?;
        println!("{}", response.message);
        Ok(())
    }

    pub async fn whoami(&mut self) -> Result<()> {
        self.ready().await?;
        match self.session.user() {
            Some(user) => println!("{} (id {}, {})", user.email, user.id, user.role),
            None => println!("Logged in, identity not loaded"),
        }
        Ok(())
    }

    // ===== Profile =====

    pub async fn show_profile(&mut self) -> Result<()> {
        self.ready().await?;
        let profile = self.gateway.get_profile().await?;
        println!("Email:          {}", profile.email);
        println!("Role:           {}", profile.role);
        println!("Address:        {}", format_optional(&profile.address, "-"));
        println!(
            "Phone:          {}",
            profile
                .phone_number
                .as_deref()
                .map(format_phone)
                .unwrap_or_else(|| "-".to_string())
        );
        println!("Payment method: {}", format_optional(&profile.payment_method, "-"));
        println!("Registered:     {}", format_date(&profile.registered_at));
        println!("Updated:        {}", format_date(&profile.updated_at));
        Ok(())
    }

    pub async fn update_profile(
        &mut self,
        address: Option<String>,
        phone_number: Option<String>,
        payment_method: Option<String>,
    ) -> Result<()> {
        self.ready().await?;
        let current = self.gateway.get_profile().await?;
        let mut update = UserProfileUpdate::from_profile(&current);
        if let Some(address) = address {
            update.address = address;
        }
        if let Some(phone_number) = phone_number {
            update.phone_number = phone_number;
        }
        if let Some(payment_method) = payment_method {
            update.payment_method = payment_method;
        }

        let updated = self.gateway.update_profile(&update).await?;
        println!("Profile updated {}", format_date(&updated.updated_at));
        Ok(())
    }

    pub async fn change_password(&mut self) -> Result<()> {
        self.ready().await?;
        let old_password = Self::prompt_password("Current password")?;
        let new_password = Self::prompt_password("New password")?;
        let response = self
            .gateway
            .change_password(&old_password, &new_password)
            .await?;
        println!("{}", response.message);
        Ok(())
    }

    // ===== Drugs =====

    pub async fn list_drugs(&mut self, public: bool) -> Result<()> {
        let drugs = if public {
            self.gateway.list_public_drugs().await?
        } else {
            self.ready().await?;
            self.gateway.list_drugs().await?
        };
        Self::print_drugs(&drugs);
        Ok(())
    }

    pub async fn search_drugs(&mut self, query: String) -> Result<()> {
        let drugs = self.gateway.search_public_drugs(&query).await?;
        if drugs.is_empty() {
            println!("No drugs match '{}'", query);
        }
        Self::print_drugs(&drugs);
        Ok(())
    }

    pub async fn show_drug(&mut self, id: i64) -> Result<()> {
        self.ready().await?;
        let drug = self.gateway.get_drug(id).await?;
        println!("{} ({})", drug.name, drug.kind);
        println!("Manufacturer: {}", drug.manufacturer);
        println!("Dosage:       {}", drug.dosage);
        println!("Availability: {}", drug.availability_display());
        if !drug.description.is_empty() {
            println!();
            println!("{}", drug.description);
        }
        Ok(())
    }

    fn print_drugs(drugs: &[pharmacy_core::models::Drug]) {
        for drug in drugs {
            println!(
                "{:>5}  {:<24} {:<10} {:<18} {}",
                drug.id,
                truncate_string(&drug.name, 24),
                drug.dosage,
                drug.availability_display(),
                truncate_string(&drug.description, DESCRIPTION_WIDTH)
            );
        }
    }

    // ===== Prescriptions =====

    pub async fn list_prescriptions(&mut self) -> Result<()> {
        self.ready().await?;
        let prescriptions = self.gateway.list_prescriptions().await?;
        if prescriptions.is_empty() {
            println!("No prescriptions");
        }
        for p in &prescriptions {
            println!(
                "{:>5}  {:<24} {:<10} {:<14} expires {}{}",
                p.id,
                truncate_string(&p.drug_name, 24),
                p.dosage,
                p.frequency,
                format_date(&p.expires_at),
                if p.is_expired() { " (expired)" } else { "" }
            );
        }
        Ok(())
    }

    pub async fn show_prescription(&mut self, id: i64) -> Result<()> {
        self.ready().await?;
        let p = self.gateway.get_prescription(id).await?;
        println!("{} {}, {}", p.drug_name, p.dosage, p.frequency);
        println!("Issued:  {}", format_date(&p.issued_at));
        println!("Expires: {}", format_date(&p.expires_at));
        Ok(())
    }

    pub async fn create_prescription(
        &mut self,
        drug_id: i64,
        dosage: String,
        frequency: String,
        valid_days: i64,
    ) -> Result<()> {
        let issued_at = Utc::now();
        let expires_at = expiry_after(issued_at, valid_days)?;
        self.ready().await?;
        let drug = self.gateway.get_drug(drug_id).await?;
        let request = PrescriptionRequest {
            drug_id,
            dosage,
            frequency,
            prescription_required: drug.prescription_required,
            issued_at,
            expires_at,
        };
        let created = self.gateway.create_prescription(&request).await?;
        println!("Created prescription {} for {}", created.id, created.drug_name);
        Ok(())
    }

    pub async fn update_prescription(
        &mut self,
        id: i64,
        dosage: Option<String>,
        frequency: Option<String>,
        valid_days: Option<i64>,
    ) -> Result<()> {
        self.ready().await?;
        let current = self.gateway.get_prescription(id).await?;
        let expires_at = match valid_days {
            Some(days) => expiry_after(current.issued_at, days)?,
            None => current.expires_at,
        };
        let drugs = self.gateway.list_drugs().await?;
        let drug = drugs
            .iter()
            .find(|d| d.name == current.drug_name)
            .ok_or_else(|| anyhow::anyhow!("Drug '{}' is no longer listed", current.drug_name))?;

        let request = PrescriptionRequest {
            drug_id: drug.id,
            dosage: dosage.unwrap_or(current.dosage),
            frequency: frequency.unwrap_or(current.frequency),
            prescription_required: current.prescription_required,
            issued_at: current.issued_at,
            expires_at,
        };
        let updated = self.gateway.update_prescription(id, &request).await?;
        println!("Updated prescription {}", updated.id);
        Ok(())
    }

    pub async fn delete_prescription(&mut self, id: i64) -> Result<()> {
        self.ready().await?;
        self.gateway.delete_prescription(id).await?;
        println!("Deleted prescription {}", id);
        Ok(())
    }

    /// Profile and prescriptions side by side, fetched concurrently.
    pub async fn status(&mut self) -> Result<()> {
        self.ready().await?;
        let (profile, prescriptions) = futures::try_join!(
            self.gateway.get_profile(),
            self.gateway.list_prescriptions()
        )?;

        let active = prescriptions.iter().filter(|p| !p.is_expired()).count();
        println!("{} ({})", profile.email, profile.role);
        println!(
            "{} prescriptions, {} active, {} expired",
            prescriptions.len(),
            active,
            prescriptions.len() - active
        );
        Ok(())
    }

    pub fn eviction_notice() -> String {
        format!(
            "Session expired. Please log in again ({}): pharmacy login",
            LOGIN_ROUTE
        )
    }
}

/// Expiry `days` after `issued_at`, rejecting values chrono cannot represent.
fn expiry_after(issued_at: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_days(days)
        .and_then(|delta| issued_at.checked_add_signed(delta))
        .ok_or_else(|| anyhow::anyhow!("--valid-days {} is out of range", days))
}
