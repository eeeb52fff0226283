//! Object stage: per-stream include/exclude class lists.

use nvr_models::{Detection, ObjectFilter};

/// Keep detections whose label the stream's object filter accepts.
pub fn apply_object_filter(filter: &ObjectFilter, mut detections: Vec<Detection>) -> Vec<Detection> {
    if filter.is_pass_through() {
        return detections;
    }
    detections.retain(|d| filter.accepts(&d.label));
    detections
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvr_models::ObjectFilterMode;

    fn labeled(label: &str) -> Detection {
        Detection::new(label, 0.9, 0.1, 0.1, 0.2, 0.2)
    }

    #[test]
    fn test_include_list() {
        let filter = ObjectFilter::new(
            ObjectFilterMode::Include,
            vec!["person".to_string(), "car".to_string()],
        );
        let out = apply_object_filter(&filter, vec![labeled("person"), labeled("bicycle")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "person");
    }

    #[test]
    fn test_exclude_list() {
        let filter = ObjectFilter::new(ObjectFilterMode::Exclude, vec!["cat".to_string()]);
        let out = apply_object_filter(&filter, vec![labeled("cat"), labeled("dog")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "dog");
    }

    #[test]
    fn test_none_mode_ignores_list() {
        let filter = ObjectFilter::new(ObjectFilterMode::None, vec!["cat".to_string()]);
        let out = apply_object_filter(&filter, vec![labeled("cat")]);
        assert_eq!(out.len(), 1);
    }
}
