//! Variable resolution
//!
//! Expands property and environment variable references in a string against
//! a [`VariableStore`], repeating until the output is stable so properties
//! defined in terms of other properties resolve transitively. The number of
//! productive passes is capped by the store size, so a reference cycle is
//! reported instead of looping.

use crate::engine::store::VariableStore;
use crate::engine::tokenizer::{TokenCache, TokenKind};
use crate::error::EngineError;

/// What to do with a property reference that is still unresolved once the
/// output is stable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolvePolicy {
    /// Leave the reference in the output verbatim
    #[default]
    PassThrough,
    /// Fail resolution naming the first unresolved property
    Strict,
}

/// Resolves strings against a variable store, memoizing tokenization
#[derive(Debug, Default)]
pub struct Resolver {
    policy: ResolvePolicy,
    cache: TokenCache,
}

impl Resolver {
    pub fn new(policy: ResolvePolicy) -> Self {
        Resolver {
            policy,
            cache: TokenCache::default(),
        }
    }

    /// Resolve using the configured policy
    pub fn resolve(
        &mut self,
        input: &str,
        store: &VariableStore,
    ) -> Result<String, EngineError> {
        self.resolve_with(input, store, self.policy)
    }

    /// Resolve, failing if any property reference survives to the stable
    /// output regardless of the configured policy
    pub fn resolve_strict(
        &mut self,
        input: &str,
        store: &VariableStore,
    ) -> Result<String, EngineError> {
        self.resolve_with(input, store, ResolvePolicy::Strict)
    }

    fn resolve_with(
        &mut self,
        input: &str,
        store: &VariableStore,
        policy: ResolvePolicy,
    ) -> Result<String, EngineError> {
        // A chain of distinct properties can need one pass per property, so
        // any run of passes longer than the store has keys is a cycle
        let max_passes = store.properties().len() + 1;
        let mut current = input.to_string();
        let mut passes = 0usize;

        loop {
            let next = self.substitute(&current, store)?;
            if next == current {
                break;
            }
            passes += 1;
            if passes > max_passes {
                return Err(EngineError::CyclicReference(input.to_string()));
            }
            current = next;
        }

        if policy == ResolvePolicy::Strict {
            for token in self.cache.tokenize(&current)? {
                if token.kind == TokenKind::Property {
                    return Err(EngineError::UnresolvedProperty(token.value));
                }
            }
        }

        // Escapes held literal through every pass unwind exactly once here
        Ok(current.replace("\\$", "$"))
    }

    /// One substitution pass; unknown references stay verbatim
    fn substitute(
        &mut self,
        input: &str,
        store: &VariableStore,
    ) -> Result<String, EngineError> {
        let tokens = self.cache.tokenize(input)?;
        let mut out = String::with_capacity(input.len());

        for token in tokens {
            match token.kind {
                TokenKind::Text => out.push_str(&token.raw),
                TokenKind::EnvironmentVariable => match store.env(&token.value) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&token.raw),
                },
                TokenKind::Property => match store.property(&token.value) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&token.raw),
                },
            }
        }

        Ok(out)
    }
}
