//! CRM en memoria: leads, órdenes de trabajo, técnicos, reportes, afiliados y
//! backlinks.
//!
//! El almacenamiento persistente queda fuera del servicio; este almacén
//! vive lo que vive el proceso y se comparte tras un `Mutex` en `AppState`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{
    interpreter::Interpretation,
    models::{
        Affiliate, Backlink, Lead, LeadNote, LeadStatus, Order, OrderStatus, Payout, Technician,
        WorkReport,
    },
};

/// Comisión de afiliado sobre el monto convertido.
pub const AFFILIATE_COMMISSION: f64 = 0.05;

/// Máximo de órdenes devueltas por listado.
pub const ORDER_LIST_LIMIT: usize = 100;

/// Autor de las notas de seguimiento.
pub const NOTE_AUTHOR: &str = "tecnico@plomerocancun.com.mx";

pub const PAYOUT_METHOD: &str = "mercado-pago";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrmError {
    #[error("orden {0} no encontrada")]
    OrderNotFound(u64),
    #[error("técnico {0} no encontrado")]
    TechnicianNotFound(u64),
    #[error("ya existe un técnico con el teléfono {0}")]
    DuplicatePhone(String),
}

/// Datos validados de un lead nuevo.
#[derive(Debug, Clone, Default)]
pub struct NewLead {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub service: String,
    pub street: String,
    pub colonia: Option<String>,
    pub postal_code: Option<String>,
    pub address: Option<String>,
    pub supermanzana: Option<String>,
    pub description: String,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
}

impl NewLead {
    /// Dirección explícita o `"<calle>, <colonia> <cp>"`.
    pub fn full_address(&self) -> String {
        match &self.address {
            Some(address) if !address.trim().is_empty() => address.clone(),
            _ => format!(
                "{}, {} {}",
                self.street,
                self.colonia.as_deref().unwrap_or(""),
                self.postal_code.as_deref().unwrap_or("")
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub urgency: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub assigned_technician: Option<String>,
    pub scheduled_at: Option<String>,
    pub actual_cost: Option<f64>,
    pub internal_notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewTechnician {
    pub name: String,
    pub phone: String,
    pub specialties: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkReport {
    pub technician_id: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub materials_used: Vec<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    pub client_signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmSummary {
    pub pending: usize,
    pub completed: usize,
    pub total_revenue: f64,
    pub leads: usize,
    pub affiliates: usize,
    pub generated_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct CrmStore {
    leads: Vec<Lead>,
    orders: Vec<Order>,
    affiliates: Vec<Affiliate>,
    backlinks: Vec<Backlink>,
    technicians: Vec<Technician>,
    reports: Vec<WorkReport>,
    last_order_id: u64,
    last_technician_id: u64,
    last_report_id: u64,
}

impl CrmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra el lead y crea automáticamente su orden de trabajo a partir
    /// de la interpretación de la descripción.
    pub fn create_lead(&mut self, new: NewLead, interpretation: &Interpretation) -> (Lead, Order) {
        let now = Utc::now();
        let lead = Lead {
            id: Uuid::new_v4(),
            address: new.full_address(),
            name: new.name,
            phone: new.phone,
            email: new.email,
            service: new.service,
            street: new.street,
            colonia: new.colonia,
            postal_code: new.postal_code,
            supermanzana: new.supermanzana,
            description: new.description,
            appointment_date: new.appointment_date,
            appointment_time: new.appointment_time,
            source: "website-form".to_string(),
            status: LeadStatus::New,
            notes: Vec::new(),
            resolution: None,
            created_at: now,
            updated_at: None,
            closed_at: None,
        };

        self.last_order_id += 1;
        let urgency = if interpretation.is_urgent() { "ALTA" } else { "NORMAL" };
        let order = Order {
            id: self.last_order_id,
            lead_id: lead.id,
            client_name: lead.name.clone(),
            client_phone: lead.phone.clone(),
            address: lead.address.clone(),
            client_description: lead.description.clone(),
            technical_interpretation: interpretation.technician_text.clone(),
            assigned_service: lead.service.clone(),
            urgency: urgency.to_string(),
            severity: interpretation.severity,
            status: OrderStatus::Pendiente,
            assigned_technician: None,
            scheduled_at: lead.appointment_date.clone(),
            estimated_cost: None,
            actual_cost: None,
            internal_notes: None,
            created_at: now,
            completed_at: None,
        };

        info!("Lead {} creado con la orden {}", lead.id, order.id);
        self.leads.push(lead.clone());
        self.orders.push(order.clone());
        (lead, order)
    }

    /// Leads, del más reciente al más antiguo.
    pub fn leads(&self) -> Vec<Lead> {
        self.leads.iter().rev().cloned().collect()
    }

    pub fn add_lead_note(&mut self, id: Uuid, text: String) -> Option<Lead> {
        let lead = self.leads.iter_mut().find(|l| l.id == id)?;
        let now = Utc::now();
        lead.notes.push(LeadNote {
            id: Uuid::new_v4(),
            text,
            by: NOTE_AUTHOR.to_string(),
            created_at: now,
        });
        lead.updated_at = Some(now);
        Some(lead.clone())
    }

    pub fn close_lead(&mut self, id: Uuid, resolution: String) -> Option<Lead> {
        let lead = self.leads.iter_mut().find(|l| l.id == id)?;
        let now = Utc::now();
        lead.status = LeadStatus::Closed;
        lead.resolution = Some(resolution);
        lead.closed_at = Some(now);
        lead.updated_at = Some(now);
        info!("Lead {} cerrado", lead.id);
        Some(lead.clone())
    }

    pub fn order(&self, id: u64) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    /// Órdenes filtradas, de la más reciente a la más antigua.
    pub fn orders(&self, filter: &OrderFilter) -> Vec<Order> {
        self.orders
            .iter()
            .rev()
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .filter(|o| {
                filter
                    .urgency
                    .as_deref()
                    .map_or(true, |u| o.urgency.eq_ignore_ascii_case(u))
            })
            .take(ORDER_LIST_LIMIT)
            .cloned()
            .collect()
    }

    pub fn update_order(&mut self, id: u64, update: OrderUpdate) -> Option<Order> {
        let order = self.orders.iter_mut().find(|o| o.id == id)?;
        if let Some(status) = update.status {
            order.status = status;
            if status == OrderStatus::Completada {
                order.completed_at = Some(Utc::now());
            }
        }
        if let Some(technician) = update.assigned_technician {
            order.assigned_technician = Some(technician);
        }
        if let Some(scheduled_at) = update.scheduled_at {
            order.scheduled_at = Some(scheduled_at);
        }
        if let Some(cost) = update.actual_cost {
            order.actual_cost = Some(cost);
        }
        if let Some(notes) = update.internal_notes {
            order.internal_notes = Some(notes);
        }
        Some(order.clone())
    }

    pub fn register_affiliate(
        &mut self,
        name: String,
        whatsapp: String,
        client_area: Option<String>,
        email: Option<String>,
    ) -> Affiliate {
        let affiliate = Affiliate {
            id: Uuid::new_v4(),
            name,
            client_area: client_area.unwrap_or_else(|| "Cancún".to_string()),
            whatsapp,
            email,
            affiliate_code: short_code("PLOM"),
            earnings: 0.0,
            conversions: 0,
            status: "active".to_string(),
            payouts: Vec::new(),
            created_at: Utc::now(),
        };
        info!("Afiliado {} registrado ({})", affiliate.id, affiliate.affiliate_code);
        self.affiliates.push(affiliate.clone());
        affiliate
    }

    pub fn affiliate(&self, code: &str) -> Option<&Affiliate> {
        self.affiliates.iter().find(|a| a.affiliate_code == code)
    }

    /// Suma la comisión de una conversión al afiliado.
    pub fn track_conversion(&mut self, code: &str, amount: f64) -> Option<Affiliate> {
        let affiliate = self
            .affiliates
            .iter_mut()
            .find(|a| a.affiliate_code == code)?;
        let commission = amount * AFFILIATE_COMMISSION;
        affiliate.earnings += commission;
        affiliate.conversions += 1;
        info!("Conversión registrada: {} = ${:.2}", code, commission);
        Some(affiliate.clone())
    }

    /// Registra un pago pendiente por lo acumulado y deja las ganancias en cero.
    pub fn process_payout(&mut self, code: &str) -> Option<Payout> {
        let affiliate = self
            .affiliates
            .iter_mut()
            .find(|a| a.affiliate_code == code)?;
        let payout = Payout {
            id: Uuid::new_v4(),
            amount: affiliate.earnings,
            method: PAYOUT_METHOD.to_string(),
            status: "pending".to_string(),
            created_at: Utc::now(),
            processed_at: None,
        };
        affiliate.earnings = 0.0;
        affiliate.payouts.push(payout.clone());
        info!("Pago solicitado para {}: ${:.2}", code, payout.amount);
        Some(payout)
    }

    pub fn register_backlink(
        &mut self,
        name: String,
        website: String,
        whatsapp: Option<String>,
        email: Option<String>,
    ) -> Backlink {
        let backlink = Backlink {
            id: Uuid::new_v4(),
            name,
            website,
            whatsapp,
            email,
            backlink_code: short_code("PLM"),
            status: "pending-verification".to_string(),
            traffic: 0,
            created_at: Utc::now(),
            verified_at: None,
        };
        info!("Backlink registrado: {}", backlink.backlink_code);
        self.backlinks.push(backlink.clone());
        backlink
    }

    /// Cuenta un clic; `false` si el código no existe.
    pub fn track_backlink_click(&mut self, code: &str) -> bool {
        match self.backlinks.iter_mut().find(|b| b.backlink_code == code) {
            Some(backlink) => {
                backlink.traffic += 1;
                true
            }
            None => false,
        }
    }

    pub fn verify_backlink(&mut self, code: &str) -> Option<Backlink> {
        let backlink = self
            .backlinks
            .iter_mut()
            .find(|b| b.backlink_code == code)?;
        backlink.status = "verified".to_string();
        backlink.verified_at = Some(Utc::now());
        info!("Backlink verificado: {}", code);
        Some(backlink.clone())
    }

    /// El teléfono identifica al técnico; no se admiten duplicados.
    pub fn register_technician(&mut self, new: NewTechnician) -> Result<Technician, CrmError> {
        if self.technicians.iter().any(|t| t.phone == new.phone) {
            return Err(CrmError::DuplicatePhone(new.phone));
        }
        self.last_technician_id += 1;
        let technician = Technician {
            id: self.last_technician_id,
            name: new.name,
            phone: new.phone,
            specialties: new.specialties,
            available: true,
            completed_orders: 0,
            rating: 0.0,
            registered_at: Utc::now(),
        };
        info!("Técnico {} registrado ({})", technician.id, technician.name);
        self.technicians.push(technician.clone());
        Ok(technician)
    }

    pub fn available_technicians(&self) -> Vec<Technician> {
        self.technicians
            .iter()
            .filter(|t| t.available)
            .cloned()
            .collect()
    }

    /// Guarda el reporte y marca la orden como completada.
    pub fn submit_work_report(
        &mut self,
        order_id: u64,
        report: NewWorkReport,
    ) -> Result<WorkReport, CrmError> {
        let order = self
            .orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or(CrmError::OrderNotFound(order_id))?;
        let technician = self
            .technicians
            .iter_mut()
            .find(|t| t.id == report.technician_id)
            .ok_or(CrmError::TechnicianNotFound(report.technician_id))?;

        let now = Utc::now();
        order.status = OrderStatus::Completada;
        order.completed_at = Some(now);
        technician.completed_orders += 1;

        self.last_report_id += 1;
        let work_report = WorkReport {
            id: self.last_report_id,
            order_id,
            technician_id: report.technician_id,
            description: report.description,
            materials_used: report.materials_used,
            photos: report.photos,
            client_signature: report.client_signature,
            started_at: now,
            finished_at: now,
        };
        info!("Reporte {} recibido; orden {} completada", work_report.id, order_id);
        self.reports.push(work_report.clone());
        Ok(work_report)
    }

    /// Último reporte entregado para la orden.
    pub fn work_report(&self, order_id: u64) -> Option<&WorkReport> {
        self.reports.iter().rev().find(|r| r.order_id == order_id)
    }

    pub fn summary(&self) -> CrmSummary {
        let completed: Vec<&Order> = self
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completada)
            .collect();
        CrmSummary {
            pending: self.orders.iter().filter(|o| o.status.is_open()).count(),
            completed: completed.len(),
            total_revenue: completed.iter().filter_map(|o| o.actual_cost).sum(),
            leads: self.leads.len(),
            affiliates: self.affiliates.len(),
            generated_at: Utc::now(),
        }
    }
}

/// `<PREFIJO>-XXXXXX` en mayúsculas.
fn short_code(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, raw[..6].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        glossary::Glossary,
        interpreter::{translate_to_technician, InterpretOptions},
    };

    fn new_lead(description: &str) -> NewLead {
        NewLead {
            name: "Ana".to_string(),
            phone: "9981234567".to_string(),
            service: "Cisternas".to_string(),
            street: "Av. Nichupté 5".to_string(),
            colonia: Some("SM 15".to_string()),
            postal_code: Some("77500".to_string()),
            description: description.to_string(),
            ..NewLead::default()
        }
    }

    fn interpret(text: &str) -> Interpretation {
        translate_to_technician(&Glossary::nmx(), text, InterpretOptions::default())
    }

    #[test]
    fn address_is_composed_when_missing() {
        let lead = new_lead("");
        assert_eq!(lead.full_address(), "Av. Nichupté 5, SM 15 77500");
        let explicit = NewLead {
            address: Some("Calle 1".to_string()),
            ..new_lead("")
        };
        assert_eq!(explicit.full_address(), "Calle 1");
    }

    #[test]
    fn lead_creates_pending_order() {
        let mut store = CrmStore::new();
        let text = "Hay inundación y humedad en el baño";
        let (lead, order) = store.create_lead(new_lead(text), &interpret(text));
        assert_eq!(order.lead_id, lead.id);
        assert_eq!(order.id, 1);
        assert_eq!(order.urgency, "ALTA");
        assert_eq!(order.severity, 2);
        assert_eq!(order.status, OrderStatus::Pendiente);
        assert!(order.technical_interpretation.starts_with("Resumen técnico sugerido:"));
        assert_eq!(store.leads().len(), 1);
    }

    #[test]
    fn orders_filter_and_update() {
        let mut store = CrmStore::new();
        store.create_lead(new_lead("goteo"), &interpret("goteo"));
        store.create_lead(new_lead("fuga y moho"), &interpret("fuga y moho"));

        let urgent = store.orders(&OrderFilter {
            urgency: Some("alta".to_string()),
            ..OrderFilter::default()
        });
        assert_eq!(urgent.len(), 1);
        assert_eq!(urgent[0].id, 2);

        let updated = store
            .update_order(
                1,
                OrderUpdate {
                    status: Some(OrderStatus::Completada),
                    actual_cost: Some(450.0),
                    ..OrderUpdate::default()
                },
            )
            .unwrap();
        assert!(updated.completed_at.is_some());
        assert!(store.update_order(99, OrderUpdate::default()).is_none());

        let summary = store.summary();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.total_revenue, 450.0);

        let done = store.orders(&OrderFilter {
            status: Some(OrderStatus::Completada),
            ..OrderFilter::default()
        });
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, 1);
    }

    #[test]
    fn affiliate_conversion_adds_commission() {
        let mut store = CrmStore::new();
        let affiliate = store.register_affiliate("Luis".into(), "998000".into(), None, None);
        assert_eq!(affiliate.client_area, "Cancún");
        assert!(affiliate.affiliate_code.starts_with("PLOM-"));
        assert_eq!(affiliate.affiliate_code.len(), "PLOM-".len() + 6);

        let updated = store
            .track_conversion(&affiliate.affiliate_code, 1000.0)
            .unwrap();
        assert_eq!(updated.conversions, 1);
        assert!((updated.earnings - 50.0).abs() < f64::EPSILON);
        assert!(store.track_conversion("PLOM-NOPE00", 10.0).is_none());
    }

    #[test]
    fn backlink_clicks_are_counted() {
        let mut store = CrmStore::new();
        let backlink = store.register_backlink(
            "Blog Cancún".into(),
            "https://blog.mx".into(),
            None,
            None,
        );
        assert_eq!(backlink.status, "pending-verification");
        assert!(store.track_backlink_click(&backlink.backlink_code));
        assert!(!store.track_backlink_click("PLM-000000"));
    }

    #[test]
    fn lead_notes_and_closing() {
        let mut store = CrmStore::new();
        let (lead, _) = store.create_lead(new_lead("goteo"), &interpret("goteo"));
        assert_eq!(lead.status, LeadStatus::New);

        let noted = store
            .add_lead_note(lead.id, "Cliente prefiere la tarde".into())
            .unwrap();
        assert_eq!(noted.notes.len(), 1);
        assert_eq!(noted.notes[0].by, NOTE_AUTHOR);
        assert!(noted.updated_at.is_some());

        let closed = store.close_lead(lead.id, "Reparado".into()).unwrap();
        assert_eq!(closed.status, LeadStatus::Closed);
        assert_eq!(closed.resolution.as_deref(), Some("Reparado"));
        assert!(closed.closed_at.is_some());
        assert_eq!(closed.notes.len(), 1);

        assert!(store.close_lead(Uuid::new_v4(), "x".into()).is_none());
    }

    #[test]
    fn payout_resets_earnings() {
        let mut store = CrmStore::new();
        let code = store
            .register_affiliate("Luis".into(), "998000".into(), None, None)
            .affiliate_code;
        store.track_conversion(&code, 2000.0);

        let payout = store.process_payout(&code).unwrap();
        assert_eq!(payout.method, PAYOUT_METHOD);
        assert_eq!(payout.status, "pending");
        assert!((payout.amount - 100.0).abs() < 1e-9);
        assert!(payout.processed_at.is_none());

        let affiliate = store.affiliate(&code).unwrap();
        assert_eq!(affiliate.earnings, 0.0);
        assert_eq!(affiliate.payouts.len(), 1);
        assert_eq!(affiliate.conversions, 1);
        assert!(store.process_payout("PLOM-NOPE00").is_none());
    }

    #[test]
    fn backlink_verification_stamps_date() {
        let mut store = CrmStore::new();
        let code = store
            .register_backlink("Blog".into(), "https://blog.mx".into(), None, None)
            .backlink_code;
        let verified = store.verify_backlink(&code).unwrap();
        assert_eq!(verified.status, "verified");
        assert!(verified.verified_at.is_some());
        assert!(store.verify_backlink("PLM-000000").is_none());
    }

    fn technician(phone: &str) -> NewTechnician {
        NewTechnician {
            name: "Jorge".to_string(),
            phone: phone.to_string(),
            specialties: vec!["fuga".to_string(), "goteo".to_string()],
        }
    }

    #[test]
    fn technicians_are_unique_by_phone() {
        let mut store = CrmStore::new();
        let first = store.register_technician(technician("998222")).unwrap();
        assert_eq!(first.id, 1);
        assert!(first.available);
        assert_eq!(
            store.register_technician(technician("998222")).unwrap_err(),
            CrmError::DuplicatePhone("998222".to_string())
        );
        let listed = store.available_technicians();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].specialties, vec!["fuga", "goteo"]);
    }

    #[test]
    fn work_report_completes_order() {
        let mut store = CrmStore::new();
        let (_, order) = store.create_lead(new_lead("fuga"), &interpret("fuga"));
        let tech = store.register_technician(technician("998333")).unwrap();

        let report = store
            .submit_work_report(
                order.id,
                NewWorkReport {
                    technician_id: tech.id,
                    description: "Cambio de empaque".into(),
                    materials_used: vec!["empaque 1/2\"".into()],
                    ..NewWorkReport::default()
                },
            )
            .unwrap();
        assert_eq!(report.order_id, order.id);

        let completed = store.order(order.id).unwrap();
        assert_eq!(completed.status, OrderStatus::Completada);
        assert!(completed.completed_at.is_some());
        assert_eq!(store.work_report(order.id).unwrap().id, report.id);
        assert_eq!(store.available_technicians()[0].completed_orders, 1);
    }

    #[test]
    fn work_report_requires_known_order_and_technician() {
        let mut store = CrmStore::new();
        let (_, order) = store.create_lead(new_lead("fuga"), &interpret("fuga"));
        assert_eq!(
            store
                .submit_work_report(42, NewWorkReport::default())
                .unwrap_err(),
            CrmError::OrderNotFound(42)
        );
        let err = store
            .submit_work_report(
                order.id,
                NewWorkReport {
                    technician_id: 7,
                    ..NewWorkReport::default()
                },
            )
            .unwrap_err();
        assert_eq!(err, CrmError::TechnicianNotFound(7));
        assert_eq!(store.order(order.id).unwrap().status, OrderStatus::Pendiente);
    }
}
