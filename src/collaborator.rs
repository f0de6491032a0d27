//! Interfaces to the services that know about the build tool and the configured
//! project. Both are implemented outside this crate.

/// Help text harvested from the build tool
pub trait DocumentationProvider {
    /// Documentation of a builtin command; `name` is case-folded by the caller.
    fn command_doc(&self, name: &str) -> Option<String>;

    fn variable_doc(&self, name: &str) -> Option<String>;

    /// `package` selects the `Find<name>` module used by `find_package`.
    fn module_doc(&self, name: &str, package: bool) -> Option<String>;

    fn search_commands(&self, prefix: &str) -> Vec<String>;

    fn search_variables(&self, prefix: &str) -> Vec<String>;

    /// With `package` set, names are returned without their `Find` prefix.
    fn search_modules(&self, prefix: &str, package: bool) -> Vec<String>;
}

/// State of a configured build tree
pub trait ProjectModel {
    fn targets(&self) -> Vec<String>;

    /// Current cache value of a variable
    fn cached_variable(&self, name: &str) -> Option<String>;

    fn search_targets(&self, prefix: &str) -> Vec<String> {
        self.targets()
            .into_iter()
            .filter(|target| target.starts_with(prefix))
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_search_targets_filters_by_prefix() {
        let project = StaticProject {
            targets: vec!["app".into(), "applet".into(), "lib".into()],
            ..Default::default()
        };
        assert_eq!(project.search_targets("app"), vec!["app", "applet"]);
        assert!(project.search_targets("x").is_empty());
    }

    #[test]
    fn test_package_modules_drop_find_prefix() {
        let docs = StaticDocs::sample();
        assert_eq!(docs.search_modules("B", true), vec!["BZip2", "Boost"]);
        assert_eq!(docs.search_modules("", false), vec!["CTest"]);
        assert_eq!(docs.module_doc("Boost", true).as_deref(), Some("Find Boost."));
    }
}
