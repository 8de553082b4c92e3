//! Catálogo de servicios y enrutamiento a páginas de aterrizaje.

use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub key: &'static str,
    pub name: &'static str,
    pub name_en: &'static str,
    pub page: &'static str,
    pub icon: &'static str,
    pub price: &'static str,
    pub guarantee: &'static str,
    pub specialty: bool,
}

const fn service(
    key: &'static str,
    name: &'static str,
    name_en: &'static str,
    page: &'static str,
    icon: &'static str,
    price: &'static str,
    guarantee: &'static str,
) -> ServiceConfig {
    ServiceConfig {
        key,
        name,
        name_en,
        page,
        icon,
        price,
        guarantee,
        specialty: false,
    }
}

pub static CATALOG: &[ServiceConfig] = &[
    service(
        "Cambio de llaves y mangueras",
        "Cambio de llaves de paso, mangueras, monomandos, vástagos",
        "Shut-off valves, hoses, single-lever faucets",
        "/service-faucets.html",
        "🔧",
        "Desde $300",
        "Hermeticidad garantizada 12 meses",
    ),
    service(
        "Suavización / Descalcificación",
        "Suavización / Descalcificación",
        "Water Softening / Descaling",
        "/service-softening.html",
        "💧",
        "Desde $800",
        "Diagnóstico incluido",
    ),
    service(
        "Calentadores - Drenado/Desatasco",
        "Calentadores - Drenado y Desatasco",
        "Water Heaters - Draining & Unclogging",
        "/service-heaters.html",
        "🔥",
        "Desde $500",
        "Sin daño al equipo",
    ),
    service(
        "Reparación Suavizadores y Bombas",
        "Reparación de equipos de suavizadores y bombas",
        "Softener & Pump Repairs",
        "/service-equipment.html",
        "⚙️",
        "Desde $400",
        "Taller electromecánico certificado",
    ),
    service(
        "Limpieza Tinacos y Cisternas",
        "Limpieza de tinacos",
        "Tinaco Cleaning",
        "/service-tinaco.html",
        "🧼",
        "$800 (400L - 1000L)",
        "Sin sarro, reluciente",
    ),
    service(
        "Cisternas",
        "Cisternas - limpieza y mantenimiento",
        "Cisterns - Cleaning & Maintenance",
        "/service-cistern.html",
        "🏺",
        "Desde $800",
        "Brida Coflex incluida si aplica",
    ),
    service(
        "Reemplazo cuello de cera",
        "Cambio de cuello de cera por brida Coflex",
        "Wax Neck Replacement with Coflex",
        "/service-coflex.html",
        "🔩",
        "Desde $250",
        "Instalación profesional",
    ),
    service(
        "Lijado y repintado tanques",
        "Lijado y repintado de tanques estacionarios",
        "Sanding & Repainting Tanks",
        "/service-painting.html",
        "🪚",
        "Desde $1500",
        "Acabado tipo .925 Taxco",
    ),
    service(
        "Obras negras y renovaciones",
        "Obras negras, renovaciones y redes hidráulicas",
        "Rough Plumbing & Renovations",
        "/service-construction.html",
        "🏗️",
        "Cotización individual",
        "100% presupuesto transparente",
    ),
    service(
        "Impermeabilizaciones",
        "Impermeabilizaciones y prestaciones adicionales",
        "Waterproofing & Additional Services",
        "/service-waterproofing.html",
        "🛡️",
        "Cotización individual",
        "Garantía de 3 años",
    ),
    ServiceConfig {
        specialty: true,
        ..service(
            "Desincrustación de Tuberías Obstruidas / Pipe Descaling",
            "Desincrustación de Tuberías Obstruidas",
            "Pipe Descaling & Unclogging",
            "/service-descaling.html",
            "🧼",
            "Diagnóstico gratis",
            "Si no se destapa, NO PAGAS ⭐",
        )
    },
];

pub const GENERAL_PAGE: &str = "/service-general.html";

static GENERAL: ServiceConfig = service(
    "general",
    "Servicio general de plomería",
    "General plumbing service",
    GENERAL_PAGE,
    "🔧",
    "Cotizar",
    "Profesionalismo garantizado",
);

/// Configuración del servicio; los servicios fuera de catálogo usan la
/// página general.
pub fn service_config(name: &str) -> &'static ServiceConfig {
    CATALOG.iter().find(|s| s.key == name).unwrap_or(&GENERAL)
}

/// Datos mínimos de un lead para construir la URL de seguimiento.
#[derive(Debug, Clone)]
pub struct LeadRef<'a> {
    pub id: Option<&'a str>,
    pub service: &'a str,
    pub name: &'a str,
    pub phone: &'a str,
}

/// Ruta de la página del servicio con parámetros de seguimiento UTM.
pub fn build_service_page_url(lead: &LeadRef<'_>) -> String {
    let config = service_config(lead.service);
    let campaign = lead
        .service
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("lead_id", lead.id.unwrap_or("new"))
        .append_pair("service", lead.service)
        .append_pair("name", lead.name)
        .append_pair("phone", lead.phone)
        .append_pair("utm_source", "website-form")
        .append_pair("utm_medium", "lead-submission")
        .append_pair("utm_campaign", &campaign)
        .finish();

    format!("{}?{}", config.page, query)
}

/// `true` si la cadena es una URL absoluta http(s).
pub fn is_valid_website(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_service_uses_its_page() {
        let config = service_config("Cisternas");
        assert_eq!(config.page, "/service-cistern.html");
        assert!(!config.specialty);
        assert!(service_config("Desincrustación de Tuberías Obstruidas / Pipe Descaling").specialty);
    }

    #[test]
    fn unknown_service_falls_back_to_general() {
        let config = service_config("Algo raro");
        assert_eq!(config.page, GENERAL_PAGE);
        assert_eq!(config.price, "Cotizar");
    }

    #[test]
    fn page_url_carries_tracking() {
        let url = build_service_page_url(&LeadRef {
            id: Some("abc"),
            service: "Reemplazo cuello de cera",
            name: "Ana López",
            phone: "998 123 4567",
        });
        assert!(url.starts_with("/service-coflex.html?lead_id=abc&"));
        assert!(url.contains("name=Ana+L%C3%B3pez"));
        assert!(url.contains("utm_source=website-form"));
        assert!(url.contains("utm_medium=lead-submission"));
        assert!(url.ends_with("utm_campaign=reemplazo-cuello-de-cera"));
    }

    #[test]
    fn missing_lead_id_is_new() {
        let url = build_service_page_url(&LeadRef {
            id: None,
            service: "Otro",
            name: "X",
            phone: "1",
        });
        assert!(url.starts_with("/service-general.html?lead_id=new&"));
    }

    #[test]
    fn website_validation() {
        assert!(is_valid_website("https://plomerocancun.com.mx"));
        assert!(is_valid_website("http://ejemplo.mx/blog"));
        assert!(!is_valid_website("ejemplo.mx"));
        assert!(!is_valid_website("ftp://ejemplo.mx"));
    }
}
