use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::PromptError;

/// Loads stage templates from a directory and substitutes `{{name}}`
/// placeholders.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates_dir: PathBuf,
}

impl PromptLibrary {
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
        }
    }

    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
        let path = self.templates_dir.join(name);
        let mut template = fs::read_to_string(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => PromptError::TemplateNotFound {
                name: name.to_string(),
            },
            _ => PromptError::ReadFailed {
                name: name.to_string(),
                reason: err.to_string(),
            },
        })?;

        for (key, value) in vars {
            let placeholder = format!("{{{{{key}}}}}");
            template = template.replace(&placeholder, value);
        }

        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn substitutes_every_occurrence() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("stage.txt"),
            "Review {{featureScope}} and again {{featureScope}}.",
        )
        .unwrap();

        let library = PromptLibrary::new(dir.path());
        let rendered = library
            .render("stage.txt", &[("featureScope", "login flow")])
            .unwrap();
        assert_eq!(rendered, "Review login flow and again login flow.");
    }

    #[test]
    fn unresolved_placeholders_stay_verbatim() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stage.txt"), "Keep {{unknown}} as is.").unwrap();

        let library = PromptLibrary::new(dir.path());
        let rendered = library.render("stage.txt", &[]).unwrap();
        assert_eq!(rendered, "Keep {{unknown}} as is.");
    }

    #[test]
    fn missing_template_is_not_found() {
        let dir = TempDir::new().unwrap();
        let library = PromptLibrary::new(dir.path());
        let result = library.render("absent.txt", &[]);
        assert!(matches!(
            result,
            Err(PromptError::TemplateNotFound { .. })
        ));
    }
}
