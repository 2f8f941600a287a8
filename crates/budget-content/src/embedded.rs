//! Embedded YAML content tables (no filesystem reads at run time).
//! Provides stable names looked up by `get_yaml(name)`.

pub const SCHOOLS: &str = "schools";
pub const CATEGORIES: &str = "categories";
pub const TEACHER_REQUESTS: &str = "teacher_requests";
pub const CRISIS_EVENTS: &str = "crisis_events";

#[inline]
pub fn get_yaml(name: &str) -> Option<&'static str> {
    match name {
        SCHOOLS => Some(include_str!("../../../assets/content/schools.yaml")),
        CATEGORIES => Some(include_str!("../../../assets/content/categories.yaml")),
        TEACHER_REQUESTS => Some(include_str!(
            "../../../assets/content/teacher_requests.yaml"
        )),
        CRISIS_EVENTS => Some(include_str!("../../../assets/content/crisis_events.yaml")),
        _ => None,
    }
}
