//! Utility functions for the bean engine
//!
//! Bean name handling (factory dereference prefix, generated names) and the
//! dependency graph helpers shared by the factory and the singleton registry.

/// Bean name conventions for `&` dereference and generated names
pub mod naming {
    /// Prefix that requests the FactoryBean itself instead of the object it produces.
    pub const FACTORY_BEAN_PREFIX: &str = "&";

    /// Separator between a generated name and its uniqueness suffix.
    pub const GENERATED_BEAN_NAME_SEPARATOR: &str = "#";

    /// Base name for nested bean definitions without an explicit name.
    pub const INNER_BEAN_NAME: &str = "(inner bean)";

    /// Returns whether `name` is a FactoryBean dereference (`&name`).
    pub fn is_factory_dereference(name: &str) -> bool {
        name.starts_with(FACTORY_BEAN_PREFIX)
    }

    /// Strips every leading `&` from a requested name.
    ///
    /// # Examples
    ///
    /// ```
    /// use chimera_beans::utils::naming::transformed_bean_name;
    ///
    /// assert_eq!(transformed_bean_name("&&dataSource"), "dataSource");
    /// assert_eq!(transformed_bean_name("dataSource"), "dataSource");
    /// ```
    pub fn transformed_bean_name(name: &str) -> &str {
        name.trim_start_matches(FACTORY_BEAN_PREFIX)
    }

    /// Re-attaches the dereference prefix of `requested` to a resolved canonical name.
    pub fn original_bean_name(requested: &str, canonical: &str) -> String {
        if is_factory_dereference(requested) {
            factory_dereference(canonical)
        } else {
            canonical.to_string()
        }
    }

    /// `&name`
    pub fn factory_dereference(name: &str) -> String {
        format!("{}{}", FACTORY_BEAN_PREFIX, name)
    }

    /// Name for a nested bean definition, unique within one factory.
    pub fn inner_bean_name(base: Option<&str>, counter: u64) -> String {
        format!(
            "{}{}{:x}",
            base.unwrap_or(INNER_BEAN_NAME),
            GENERATED_BEAN_NAME_SEPARATOR,
            counter
        )
    }

    /// Default bean name for a Rust type: the camelCase form of its last path segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use chimera_beans::utils::naming::default_bean_name;
    ///
    /// assert_eq!(default_bean_name("my_app::service::UserService"), "userService");
    /// assert_eq!(default_bean_name("my_app::Cache<u32>"), "cache");
    /// ```
    pub fn default_bean_name(type_name: &str) -> String {
        let without_generics = type_name.split('<').next().unwrap_or(type_name);
        let short = without_generics
            .rsplit("::")
            .next()
            .unwrap_or(without_generics);
        to_camel_case(short)
    }

    /// Lower-cases the first character: `UserService` -> `userService`.
    pub fn to_camel_case(s: &str) -> String {
        let split = s.chars().next().map_or(0, char::len_utf8);
        let (head, tail) = s.split_at(split);
        head.to_lowercase() + tail
    }
}

/// Dependent-bean bookkeeping and depends-on validation
pub mod dependency {
    use std::collections::{HashMap, HashSet};

    /// Directed "A depends on B" relation between bean names.
    ///
    /// Tracks both directions plus containment (outer bean -> nested beans),
    /// so destruction can tear down dependents and contained beans first.
    #[derive(Debug, Default)]
    pub struct DependentBeanGraph {
        /// bean -> beans depending on it
        dependents: HashMap<String, Vec<String>>,
        /// bean -> beans it depends on
        dependencies: HashMap<String, Vec<String>>,
        /// containing bean -> contained beans
        contained: HashMap<String, Vec<String>>,
    }

    impl DependentBeanGraph {
        pub fn new() -> Self {
            Self::default()
        }

        /// Records that `dependent` depends on `bean`.
        pub fn register_dependent(&mut self, bean: &str, dependent: &str) {
            push_unique(&mut self.dependents, bean, dependent);
            push_unique(&mut self.dependencies, dependent, bean);
        }

        /// Records that `inner` is nested inside `containing`.
        ///
        /// The containing bean is also registered as a dependent of the inner bean.
        pub fn register_contained(&mut self, inner: &str, containing: &str) {
            push_unique(&mut self.contained, containing, inner);
            self.register_dependent(inner, containing);
        }

        /// Whether `dependent` depends on `bean`, directly or transitively.
        pub fn is_dependent(&self, bean: &str, dependent: &str) -> bool {
            let mut seen = HashSet::new();
            self.is_dependent_inner(bean, dependent, &mut seen)
        }

        fn is_dependent_inner<'a>(
            &'a self,
            bean: &'a str,
            dependent: &str,
            seen: &mut HashSet<&'a str>,
        ) -> bool {
            if !seen.insert(bean) {
                return false;
            }
            match self.dependents.get(bean) {
                None => false,
                Some(direct) => {
                    direct.iter().any(|d| d == dependent)
                        || direct
                            .iter()
                            .any(|d| self.is_dependent_inner(d, dependent, seen))
                }
            }
        }

        pub fn dependents_of(&self, bean: &str) -> Vec<String> {
            self.dependents.get(bean).cloned().unwrap_or_default()
        }

        pub fn dependencies_of(&self, bean: &str) -> Vec<String> {
            self.dependencies.get(bean).cloned().unwrap_or_default()
        }

        pub fn has_dependents(&self, bean: &str) -> bool {
            self.dependents.get(bean).is_some_and(|d| !d.is_empty())
        }

        /// Removes and returns the beans depending on `bean`.
        pub fn take_dependents(&mut self, bean: &str) -> Vec<String> {
            self.dependents.remove(bean).unwrap_or_default()
        }

        /// Removes and returns the beans contained in `bean`.
        pub fn take_contained(&mut self, bean: &str) -> Vec<String> {
            self.contained.remove(bean).unwrap_or_default()
        }

        /// Drops `bean` from every remaining relation.
        pub fn remove_bean(&mut self, bean: &str) {
            for list in self.dependents.values_mut() {
                list.retain(|d| d != bean);
            }
            self.dependents.retain(|_, list| !list.is_empty());
            self.dependencies.remove(bean);
        }

        pub fn clear(&mut self) {
            self.dependents.clear();
            self.dependencies.clear();
            self.contained.clear();
        }
    }

    fn push_unique(map: &mut HashMap<String, Vec<String>>, key: &str, value: &str) {
        let list = map.entry(key.to_string()).or_default();
        if !list.iter().any(|v| v == value) {
            list.push(value.to_string());
        }
    }

    /// Problems found in declared depends-on relations
    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum DependencyValidationError {
        /// `cycle` starts and ends with the same bean name
        #[error("Circular depends-on chain: {}", .cycle.join(" -> "))]
        CircularDependency { cycle: Vec<String> },

        #[error("Bean '{bean}' depends on '{missing}' which is not registered")]
        MissingDependency { bean: String, missing: String },
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    /// Validates declared depends-on relations for missing beans and cycles.
    ///
    /// `is_known` answers whether a name outside `dependencies` can still be
    /// resolved (for example through a parent factory). Bean names are visited
    /// in sorted order so the reported issue is deterministic.
    pub fn validate_dependency_graph<F>(
        dependencies: &HashMap<String, Vec<String>>,
        is_known: F,
    ) -> Result<(), DependencyValidationError>
    where
        F: Fn(&str) -> bool,
    {
        let mut names: Vec<&str> = dependencies.keys().map(String::as_str).collect();
        names.sort_unstable();

        let missing = names.iter().find_map(|bean| {
            dependencies[*bean]
                .iter()
                .find(|dep| !dependencies.contains_key(dep.as_str()) && !is_known(dep.as_str()))
                .map(|dep| (bean.to_string(), dep.clone()))
        });
        if let Some((bean, missing)) = missing {
            return Err(DependencyValidationError::MissingDependency { bean, missing });
        }

        let mut marks = HashMap::new();
        let mut path = Vec::new();
        for name in names {
            if let Some(cycle) = find_cycle(name, dependencies, &mut marks, &mut path) {
                return Err(DependencyValidationError::CircularDependency { cycle });
            }
        }
        Ok(())
    }

    fn find_cycle<'a>(
        node: &'a str,
        graph: &'a HashMap<String, Vec<String>>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        path.push(node);
        for dep in graph.get(node).into_iter().flatten() {
            if let Some(cycle) = find_cycle(dep, graph, marks, path) {
                return Some(cycle);
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        None
    }
}
