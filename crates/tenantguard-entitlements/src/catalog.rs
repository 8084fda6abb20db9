//! Module & Plan Catalog
//!
//! Every gated module is a variant of [`Module`] and maps to exactly one
//! [`CheckKind`]. Adding a module means adding a variant, which forces a
//! decision in [`Module::kind`] and [`Module::min_tier`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tenantguard_common::{Limit, Plan, PlanTier, QuotaLimits};

/// How a module's activation is decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    /// Flag in the tenant's channel options
    Canal,
    /// Equal to the tenant's single vertical module
    Metier,
    /// Boolean feature column on the tenant's plan
    Plan,
    /// On whenever the tenant has an active plan
    Always,
}

/// Gated product modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    // Channels
    Whatsapp,
    Sms,
    Instagram,
    Facebook,
    // Verticals
    Restaurant,
    Salon,
    Fitness,
    Retail,
    // Plan features
    Crm,
    Reservations,
    Invoicing,
    Analytics,
    AiContent,
    Seo,
    ApiAccess,
    CustomDomain,
    Rh,
    Forecasting,
    ChurnPrediction,
    WhiteLabel,
    // Core
    Dashboard,
    Clients,
    Settings,
    Billing,
}

impl Module {
    pub const ALL: [Module; 24] = [
        Self::Whatsapp,
        Self::Sms,
        Self::Instagram,
        Self::Facebook,
        Self::Restaurant,
        Self::Salon,
        Self::Fitness,
        Self::Retail,
        Self::Crm,
        Self::Reservations,
        Self::Invoicing,
        Self::Analytics,
        Self::AiContent,
        Self::Seo,
        Self::ApiAccess,
        Self::CustomDomain,
        Self::Rh,
        Self::Forecasting,
        Self::ChurnPrediction,
        Self::WhiteLabel,
        Self::Dashboard,
        Self::Clients,
        Self::Settings,
        Self::Billing,
    ];

    /// Wire id, also the channel flag / vertical id / plan feature column
    pub fn id(&self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Sms => "sms",
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Restaurant => "restaurant",
            Self::Salon => "salon",
            Self::Fitness => "fitness",
            Self::Retail => "retail",
            Self::Crm => "crm",
            Self::Reservations => "reservations",
            Self::Invoicing => "invoicing",
            Self::Analytics => "analytics",
            Self::AiContent => "ai_content",
            Self::Seo => "seo",
            Self::ApiAccess => "api_access",
            Self::CustomDomain => "custom_domain",
            Self::Rh => "rh",
            Self::Forecasting => "forecasting",
            Self::ChurnPrediction => "churn_prediction",
            Self::WhiteLabel => "white_label",
            Self::Dashboard => "dashboard",
            Self::Clients => "clients",
            Self::Settings => "settings",
            Self::Billing => "billing",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }

    pub fn kind(&self) -> CheckKind {
        match self {
            Self::Whatsapp | Self::Sms | Self::Instagram | Self::Facebook => CheckKind::Canal,
            Self::Restaurant | Self::Salon | Self::Fitness | Self::Retail => CheckKind::Metier,
            Self::Crm
            | Self::Reservations
            | Self::Invoicing
            | Self::Analytics
            | Self::AiContent
            | Self::Seo
            | Self::ApiAccess
            | Self::CustomDomain
            | Self::Rh
            | Self::Forecasting
            | Self::ChurnPrediction
            | Self::WhiteLabel => CheckKind::Plan,
            Self::Dashboard | Self::Clients | Self::Settings | Self::Billing => CheckKind::Always,
        }
    }

    /// Lowest tier whose plan includes this module (the static hierarchy)
    pub fn min_tier(&self) -> PlanTier {
        match self {
            Self::Crm | Self::Reservations | Self::Invoicing => PlanTier::Starter,
            Self::Analytics | Self::AiContent | Self::Seo | Self::ApiAccess | Self::CustomDomain => PlanTier::Pro,
            Self::Rh | Self::Forecasting | Self::ChurnPrediction | Self::WhiteLabel => PlanTier::Business,
            Self::Whatsapp
            | Self::Sms
            | Self::Instagram
            | Self::Facebook
            | Self::Restaurant
            | Self::Salon
            | Self::Fitness
            | Self::Retail
            | Self::Dashboard
            | Self::Clients
            | Self::Settings
            | Self::Billing => PlanTier::Starter,
        }
    }
}

/// Coarse gate: does `plan` include `module` by the static hierarchy.
/// Unknown plans and modules are not included.
pub fn can_plan_access_module(plan: &str, module: &str) -> bool {
    match (plan.parse::<PlanTier>(), Module::from_id(module)) {
        (Ok(tier), Some(module)) => tier >= module.min_tier(),
        _ => false,
    }
}

const GIB: u64 = 1024 * 1024 * 1024;

/// Built-in plan definitions, used when the store has no plan row
pub fn builtin_plan(tier: PlanTier) -> Plan {
    let (enabled, limits): (Vec<&str>, QuotaLimits) = match tier {
        PlanTier::Starter => (
            vec!["crm", "reservations", "invoicing"],
            QuotaLimits {
                clients: Limit::Max(1_000),
                storage_bytes: Limit::Max(5 * GIB),
                ai_posts_per_month: Limit::Max(30),
                ai_images_per_month: Limit::Max(10),
            },
        ),
        PlanTier::Pro => (
            vec![
                "crm",
                "reservations",
                "invoicing",
                "analytics",
                "ai_content",
                "seo",
                "api_access",
                "custom_domain",
            ],
            QuotaLimits {
                clients: Limit::Max(10_000),
                storage_bytes: Limit::Max(50 * GIB),
                ai_posts_per_month: Limit::Max(300),
                ai_images_per_month: Limit::Max(100),
            },
        ),
        PlanTier::Business => (
            vec![
                "crm",
                "reservations",
                "invoicing",
                "analytics",
                "ai_content",
                "seo",
                "api_access",
                "custom_domain",
                "rh",
                "forecasting",
                "churn_prediction",
                "white_label",
            ],
            QuotaLimits {
                clients: Limit::Unlimited,
                storage_bytes: Limit::Max(500 * GIB),
                ai_posts_per_month: Limit::Unlimited,
                ai_images_per_month: Limit::Unlimited,
            },
        ),
    };

    // Every plan column is present, off unless enabled
    let features: BTreeMap<String, bool> = Module::ALL
        .iter()
        .filter(|m| m.kind() == CheckKind::Plan)
        .map(|m| (m.id().to_string(), enabled.contains(&m.id())))
        .collect();

    Plan { tier, features, limits }
}
