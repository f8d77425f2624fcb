//! Lead card: the formatted view of a lead sent to channels and the spreadsheet.

use chrono::{DateTime, Utc};

use crate::clients::SheetRow;
use crate::model::LeadData;

/// Status written into the spreadsheet for freshly distributed leads.
pub const NEW_LEAD_STATUS: &str = "NEW";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadCard {
    pub contact: String,
    pub phone: String,
    pub city: String,
    pub product: String,
    pub source: String,
    pub agent: String,
    pub status: String,
    pub received_at: DateTime<Utc>,
}

impl LeadCard {
    pub fn new(data: &LeadData, source: &str, agent: &str) -> Self {
        Self {
            contact: data.name.clone(),
            phone: data.phone.clone(),
            city: data.city.clone(),
            product: data.product.clone(),
            source: source.to_string(),
            agent: agent.to_string(),
            status: NEW_LEAD_STATUS.to_string(),
            received_at: Utc::now(),
        }
    }

    /// Message for the shared channel.
    pub fn broadcast(&self) -> String {
        format!(
            "🆕 *NEW LEAD*\n\n\
             👤 *Contact:* {}\n\
             📱 *Phone:* {}\n\
             📍 *City:* {}\n\
             🎯 *Product:* {}\n\
             📊 *Source:* {}\n\
             👨‍💼 *Assigned agent:* {}\n\
             ⏰ *Received:* {}\n\n\
             _{} will contact the customer._",
            self.contact,
            self.phone,
            self.city,
            self.product,
            self.source,
            self.agent,
            self.received_at.format("%Y-%m-%d %H:%M UTC"),
            self.agent,
        )
    }

    /// Message for the assigned agent's own channel.
    pub fn directive(&self) -> String {
        format!(
            "📞 *LEAD ASSIGNED TO YOU*\n\n\
             👤 *Name:* {}\n\
             📱 *Phone:* {}\n\
             📍 *City:* {}\n\
             🎯 *Product:* {}\n\
             📊 *Source:* {}\n\n\
             ⚡ *ACTION REQUIRED:* contact the customer as soon as possible.",
            self.contact, self.phone, self.city, self.product, self.source,
        )
    }

    pub fn sheet_row(&self) -> SheetRow {
        SheetRow {
            contact: self.contact.clone(),
            city: self.city.clone(),
            product: self.product.clone(),
            source: self.source.clone(),
            agent: self.agent.clone(),
            status: self.status.clone(),
            project_type: String::new(),
        }
    }
}

/// Key used to match a lead against spreadsheet rows: lowercase, trimmed,
/// internal whitespace collapsed to single spaces.
pub fn normalize_contact(contact: &str) -> String {
    contact
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> LeadCard {
        LeadCard::new(
            &LeadData {
                name: "Ana Ruiz".to_string(),
                phone: "4621234567".to_string(),
                city: "León".to_string(),
                product: "Velaria".to_string(),
            },
            "FACEBOOK",
            "VRJ",
        )
    }

    #[test]
    fn broadcast_names_the_agent() {
        let text = card().broadcast();
        assert!(text.starts_with("🆕 *NEW LEAD*"));
        assert!(text.contains("*Assigned agent:* VRJ"));
        assert!(text.contains("*Phone:* 4621234567"));
        assert!(text.ends_with("_VRJ will contact the customer._"));
    }

    #[test]
    fn directive_carries_contact_details() {
        let text = card().directive();
        assert!(text.contains("*Name:* Ana Ruiz"));
        assert!(text.contains("*City:* León"));
        assert!(!text.contains("VRJ"));
    }

    #[test]
    fn sheet_row_follows_column_order() {
        let row = card().sheet_row();
        assert_eq!(
            row.to_values(),
            vec!["Ana Ruiz", "León", "Velaria", "FACEBOOK", "VRJ", "NEW", ""]
        );
    }

    #[test]
    fn normalization_ignores_case_and_spacing() {
        assert_eq!(normalize_contact("  Ana   RUIZ \t"), "ana ruiz");
        assert_eq!(normalize_contact("ana ruiz"), normalize_contact("Ana Ruiz"));
        assert_eq!(normalize_contact("   "), "");
    }
}
