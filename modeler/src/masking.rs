//! Display masking for sensitive property values.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskRule {
    Phone,
    Email,
    IdCard,
}

impl MaskRule {
    pub fn parse(rule: &str) -> Option<Self> {
        match rule.trim() {
            "phone" | "phone_middle_4" => Some(Self::Phone),
            "email" => Some(Self::Email),
            "idCard" | "id_card" => Some(Self::IdCard),
            _ => None,
        }
    }
}

/// Masking applies to properties with a mask rule and a sensitivity level
/// other than `public`.
pub fn should_mask(sensitivity_level: Option<&str>, mask_rule: Option<&str>) -> bool {
    let sensitive = matches!(
        sensitivity_level.map(str::trim),
        Some(level) if !level.is_empty() && level != "public"
    );
    let has_rule = mask_rule.is_some_and(|r| !r.trim().is_empty());
    sensitive && has_rule
}

/// Mask `value` under `rule`. Unknown rules and values too short to mask
/// are returned unchanged.
pub fn mask_value(rule: &str, value: &str) -> String {
    match MaskRule::parse(rule) {
        Some(MaskRule::Phone) => keep_ends(value, 3, 4),
        Some(MaskRule::IdCard) => keep_ends(value, 6, 4),
        Some(MaskRule::Email) => match value.split_once('@') {
            Some((local, domain)) if local.chars().count() > 2 => {
                format!("{}@{domain}", keep_ends(local, 2, 0))
            }
            _ => value.to_string(),
        },
        None => value.to_string(),
    }
}

/// Mask a JSON cell; only strings and numbers are masked.
pub fn mask_json(rule: &str, value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(mask_value(rule, s)),
        serde_json::Value::Number(n) => serde_json::Value::String(mask_value(rule, &n.to_string())),
        other => other.clone(),
    }
}

fn keep_ends(value: &str, head: usize, tail: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= head + tail {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    out.extend(&chars[..head]);
    out.extend(std::iter::repeat_n('*', chars.len() - head - tail));
    out.extend(&chars[chars.len() - tail..]);
    out
}
