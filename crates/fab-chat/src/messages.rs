//! User-facing message templates
//!
//! Escalations, failures and result headers go through a [`MessageCatalog`]
//! so operators can pick the language. English is the default; Vietnamese
//! is provided for the operator team.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    En,
    Vi,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::En => write!(f, "en"),
            Language::Vi => write!(f, "vi"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "vi" | "vietnamese" => Ok(Language::Vi),
            other => Err(format!("Unsupported language: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCatalog {
    language: Language,
}

impl MessageCatalog {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Header for a list of objects of one class
    pub fn found_objects(&self, count: usize, class: &str) -> String {
        match self.language {
            Language::En => format!("Found {} {} object{}:", count, class, plural(count)),
            Language::Vi => format!("Tìm thấy {} đối tượng {}:", count, class),
        }
    }

    /// Header for a list of mixed classes
    pub fn found_mixed(&self, count: usize) -> String {
        match self.language {
            Language::En => format!("Found {} object{}:", count, plural(count)),
            Language::Vi => format!("Tìm thấy {} đối tượng:", count),
        }
    }

    pub fn no_objects(&self, path: &str) -> String {
        match self.language {
            Language::En => format!(
                "No objects matched {}. The object may not exist or the query scope may be too narrow.",
                path
            ),
            Language::Vi => format!(
                "Dữ liệu trống: {} không tồn tại hoặc không có dữ liệu phù hợp.",
                path
            ),
        }
    }

    pub fn alternatives(&self, paths: &[String]) -> String {
        let list = paths.iter().map(|p| format!("- {}", p)).collect::<Vec<_>>().join("\n");
        match self.language {
            Language::En => format!("Other candidate endpoints:\n{}", list),
            Language::Vi => format!("Các endpoint khả dĩ khác:\n{}", list),
        }
    }

    /// Retrieval could not produce a usable path
    pub fn clarification(&self, request: &str, rejected: &[(String, String)]) -> String {
        let tried = rejected
            .iter()
            .map(|(candidate, reason)| format!("- {}: {}", candidate, reason))
            .collect::<Vec<_>>()
            .join("\n");
        match self.language {
            Language::En => {
                let mut text = format!(
                    "I could not find a valid API path for \"{}\". Could you name the object class, tenant or distinguished name you mean?",
                    request
                );
                if !tried.is_empty() {
                    text.push_str("\nCandidates that were rejected:\n");
                    text.push_str(&tried);
                }
                text
            }
            Language::Vi => {
                let mut text = format!(
                    "Lỗi cú pháp API: không tìm được đường dẫn API hợp lệ cho \"{}\". Vui lòng cho biết rõ lớp đối tượng, tenant hoặc DN cần truy vấn.",
                    request
                );
                if !tried.is_empty() {
                    text.push_str("\nCác đường dẫn đã bị loại:\n");
                    text.push_str(&tried);
                }
                text
            }
        }
    }

    pub fn payload_needed(&self, path: &str, reason: &str) -> String {
        match self.language {
            Language::En => format!(
                "I need the JSON body to send to {} ({}). Please include it in your message.",
                path, reason
            ),
            Language::Vi => format!(
                "Cần nội dung JSON để gửi tới {} ({}). Vui lòng bổ sung trong yêu cầu.",
                path, reason
            ),
        }
    }

    pub fn mutation_applied(&self, path: &str) -> String {
        match self.language {
            Language::En => format!("The controller accepted the change to {}.", path),
            Language::Vi => format!("APIC đã chấp nhận thay đổi tại {}.", path),
        }
    }

    /// Appended when a transformation failed and the raw data is shown instead
    pub fn transform_degraded(&self, reason: &str) -> String {
        match self.language {
            Language::En => format!(
                "Note: the data could not be post-processed ({}); showing the unprocessed result.",
                reason
            ),
            Language::Vi => format!(
                "Lưu ý: không xử lý được dữ liệu ({}); hiển thị kết quả gốc.",
                reason
            ),
        }
    }

    /// Terminal failure, listing every call the turn made
    pub fn failure(&self, reason: &str, attempts: &[String]) -> String {
        let tried = if attempts.is_empty() {
            String::new()
        } else {
            format!(
                "\n{}\n{}",
                match self.language {
                    Language::En => "Attempted:",
                    Language::Vi => "Đã thử:",
                },
                attempts
                    .iter()
                    .enumerate()
                    .map(|(i, a)| format!("{}. {}", i + 1, a))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        };
        match self.language {
            Language::En => format!("I could not complete the request: {}.{}", reason, tried),
            Language::Vi => format!(
                "Không thể hoàn thành yêu cầu: {}. Vui lòng kiểm tra thông tin đăng nhập và kết nối mạng.{}",
                reason, tried
            ),
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parse() {
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert_eq!("vi".parse::<Language>().unwrap(), Language::Vi);
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn test_failure_lists_attempts() {
        let en = MessageCatalog::default();
        let text = en.failure(
            "iteration limit exceeded",
            &["fetch_resource /api/class/faultInst.json: controller error (HTTP 503)".to_string()],
        );
        assert!(text.starts_with("I could not complete the request: iteration limit exceeded."));
        assert!(text.contains("1. fetch_resource /api/class/faultInst.json"));
    }

    #[test]
    fn test_vietnamese_templates() {
        let vi = MessageCatalog::new(Language::Vi);
        assert!(vi.no_objects("/api/mo/uni/tn-XYZ.json").starts_with("Dữ liệu trống"));
        assert!(vi.clarification("bd", &[]).starts_with("Lỗi cú pháp API"));
        assert_eq!(vi.found_objects(3, "fvTenant"), "Tìm thấy 3 đối tượng fvTenant:");
    }

    #[test]
    fn test_clarification_names_rejected_candidates() {
        let text = MessageCatalog::default().clarification(
            "list tenants",
            &[("/api/tenants".to_string(), "must match /api/<segments>.json".to_string())],
        );
        assert!(text.contains("- /api/tenants: must match"));
        assert_eq!(MessageCatalog::default().found_objects(1, "fvBD"), "Found 1 fvBD object:");
    }
}
