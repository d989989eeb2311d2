use crate::deploy::template::BuildParameters;

/// Render build parameters as `key=value` lines separated by `\n`.
pub fn render_properties(params: &BuildParameters) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_properties() {
        let mut params = BuildParameters::new();
        params.insert("version".to_string(), "1.4.2".to_string());
        params.insert("BUILD_NUMBER".to_string(), "87".to_string());
        params.insert("empty".to_string(), String::new());

        assert_eq!(
            render_properties(&params),
            "BUILD_NUMBER=87\nempty=\nversion=1.4.2"
        );
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_properties(&BuildParameters::new()), "");
    }
}
