//! Translation of many methods at once.

use log::{info, warn};
use rayon::prelude::*;

use crate::{
    analysis::tac::{translate_method, TacMethod, TranslationConfig},
    metadata::{method::MethodDescriptor, resolver::MemberResolver, typesystem::TypeJoin},
    Error,
};

/// Outcome of a batch translation.
///
/// A method either contributes a [`TacMethod`] or an [`Error::MethodFailed`] naming it; one
/// failing method never affects the others.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successfully translated methods, in input order
    pub translated: Vec<TacMethod>,
    /// Failures, in input order
    pub failures: Vec<Error>,
}

impl BatchReport {
    /// Number of methods in the batch.
    #[must_use]
    pub fn total(&self) -> usize {
        self.translated.len() + self.failures.len()
    }

    /// Returns `true` if every method translated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of the methods that failed.
    pub fn failed_methods(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().filter_map(|failure| match failure {
            Error::MethodFailed { method, .. } => Some(method.as_str()),
            _ => None,
        })
    }
}

/// Translates every method of `methods`, isolating failures per method.
///
/// Methods are translated in parallel when [`TranslationConfig::parallel`] is set; the report
/// keeps the input order either way.
///
/// # Examples
///
/// ```rust
/// use ciltac::{
///     analysis::{tac::TranslationConfig, translate_methods},
///     metadata::{
///         method::MethodDescriptor, resolver::MemoryResolver, token::Token,
///         typesystem::TypeHierarchy,
///     },
/// };
///
/// let methods = vec![
///     MethodDescriptor::new("Ok", Token::new(0x0600_0001)).with_code(vec![0x2A]),
///     // add on an empty stack
///     MethodDescriptor::new("Broken", Token::new(0x0600_0002)).with_code(vec![0x58, 0x2A]),
/// ];
/// let report = translate_methods(
///     &methods,
///     &MemoryResolver::new(),
///     &TypeHierarchy::new(),
///     &TranslationConfig::default(),
/// );
/// assert_eq!(report.translated.len(), 1);
/// assert_eq!(report.failed_methods().collect::<Vec<_>>(), vec!["Broken"]);
/// ```
pub fn translate_methods(
    methods: &[MethodDescriptor],
    resolver: &dyn MemberResolver,
    join: &dyn TypeJoin,
    config: &TranslationConfig,
) -> BatchReport {
    let translate = |method: &MethodDescriptor| {
        translate_method(method, resolver, join, config).map_err(|error| {
            warn!("{} ({}) contributes no TAC: {}", method.name, method.token, error);
            Error::MethodFailed {
                method: method.name.clone(),
                source: Box::new(error),
            }
        })
    };

    let results: Vec<_> = if config.parallel {
        methods.par_iter().map(translate).collect()
    } else {
        methods.iter().map(translate).collect()
    };

    let mut report = BatchReport::default();
    for result in results {
        match result {
            Ok(method) => report.translated.push(method),
            Err(error) => report.failures.push(error),
        }
    }

    info!(
        "translated {} of {} methods",
        report.translated.len(),
        report.total()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        resolver::MemoryResolver,
        token::Token,
        typesystem::{TacType, TypeHierarchy},
    };

    fn methods() -> Vec<MethodDescriptor> {
        (0..16u32)
            .map(|index| {
                let code = if index % 5 == 3 {
                    vec![0x26, 0x2A]
                } else {
                    vec![0x02, 0x2A]
                };
                MethodDescriptor::new(format!("M{index}"), Token::new(0x0600_0001 + index))
                    .with_params(vec![TacType::I32])
                    .with_return(TacType::I32)
                    .with_code(code)
            })
            .collect()
    }

    #[test]
    fn failures_are_isolated() {
        let report = translate_methods(
            &methods(),
            &MemoryResolver::new(),
            &TypeHierarchy::new(),
            &TranslationConfig::minimal(),
        );
        assert_eq!(report.total(), 16);
        assert!(!report.is_complete());
        assert_eq!(
            report.failed_methods().collect::<Vec<_>>(),
            vec!["M3", "M8", "M13"]
        );
        assert!(matches!(
            &report.failures[0],
            Error::MethodFailed { source, .. } if matches!(**source, Error::StackUnderflow { offset: 0 })
        ));
    }

    #[test]
    fn parallel_matches_sequential() {
        let resolver = MemoryResolver::new();
        let join = TypeHierarchy::new();
        let sequential = translate_methods(&methods(), &resolver, &join, &TranslationConfig::minimal());
        let parallel = translate_methods(&methods(), &resolver, &join, &TranslationConfig::default());

        let names = |report: &BatchReport| -> Vec<String> {
            report.translated.iter().map(|m| m.name.clone()).collect()
        };
        assert_eq!(names(&sequential), names(&parallel));
        for (a, b) in sequential.translated.iter().zip(&parallel.translated) {
            assert_eq!(a.statements, b.statements);
        }
    }
}
