//! Filtro de leads de bajo valor (regateo, "amigos", presupuestos gratis).

pub const BLACKLIST: [&str; 6] = [
    "barato",
    "cuanto es lo menos",
    "primo",
    "amigo",
    "descuento",
    "presupuesto gratis",
];

pub const REJECTION_CODE: &str = "LEAD_RECHAZADO";

pub const REJECTION_MESSAGE: &str = "Mi metodología no contempla ajustes presupuestarios. Le sugiero opciones alineadas a su capacidad de costo. Suerte.";

/// `true` si el texto contiene alguna señal de la lista negra.
pub fn is_low_value(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let lowered = text.to_lowercase();
    BLACKLIST.iter().any(|word| lowered.contains(word))
}

/// Aplica el filtro a varios campos opcionales de un formulario.
pub fn rejects<'a>(fields: impl IntoIterator<Item = Option<&'a str>>) -> bool {
    fields.into_iter().flatten().any(is_low_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_blacklisted_phrases() {
        assert!(is_low_value("¿Cuánto sale? Busco algo BARATO"));
        assert!(is_low_value("Me recomendó mi primo"));
        assert!(is_low_value("¿Hay presupuesto gratis?"));
        assert!(!is_low_value("Tengo una fuga en el baño"));
        assert!(!is_low_value(""));
    }

    #[test]
    fn checks_any_field() {
        assert!(rejects([Some("Juan"), Some("quiero descuento")]));
        assert!(rejects([Some("Amigo Pérez"), None]));
        assert!(!rejects([None, Some("Goteo en la cocina")]));
        assert!(!rejects([None, None]));
    }
}
