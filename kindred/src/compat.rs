//! Compatibility improvement.
//!
//! For compatibility-sensitive relation types, the builder tries to lift the
//! pairwise score of each newly created edge by greedily trial-swapping the
//! target's identity token against a pool of spare tokens. Best-effort and
//! local: one pass per edge, at creation time only.

use tracing::debug;

use crate::host::{HostError, HostSim, LiveId};

/// A pool of spare identity tokens minted from the host.
#[derive(Debug, Clone)]
pub struct IdentityTokenPool {
    tokens: Vec<i32>,
}

impl IdentityTokenPool {
    pub fn allocate<H: HostSim>(host: &mut H, size: usize) -> Self {
        let tokens = (0..size).map(|_| host.allocate_identity_token()).collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Greedy local search over the pool for `target`'s identity token.
    ///
    /// Keeps the best-scoring swap and returns the displaced token to the
    /// pool, so the pool size is invariant. Returns the final score.
    pub fn improve_edge<H: HostSim>(
        &mut self,
        host: &mut H,
        source: LiveId,
        target: LiveId,
    ) -> Result<f32, HostError> {
        let original = host.identity_token(target)?;
        let mut best_score = host.compatibility(source, target)?;
        let mut best_index: Option<usize> = None;

        for (index, &token) in self.tokens.iter().enumerate() {
            host.set_identity_token(target, token)?;
            let score = host.compatibility(source, target)?;
            if score > best_score {
                best_score = score;
                best_index = Some(index);
            }
        }

        match best_index {
            Some(index) => {
                host.set_identity_token(target, self.tokens[index])?;
                self.tokens[index] = original;
                debug!(%source, %target, score = best_score, "improved edge compatibility");
            }
            None => host.set_identity_token(target, original)?,
        }
        Ok(best_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CharacterKind, Gender, InMemoryHost};

    #[test]
    fn test_pool_allocates_requested_size() {
        let mut host = InMemoryHost::with_family_types();
        let pool = IdentityTokenPool::allocate(&mut host, 50);
        assert_eq!(pool.len(), 50);
        assert!(!pool.is_empty());
    }

    #[test]
    fn test_improve_never_lowers_score() {
        let mut host = InMemoryHost::with_family_types();
        let a = host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        let b = host.spawn(CharacterKind::default(), Gender::Female, 28.0);

        let before = host.compatibility(a, b).unwrap();
        let mut pool = IdentityTokenPool::allocate(&mut host, 60);
        let after = pool.improve_edge(&mut host, a, b).unwrap();

        assert!(after >= before);
        assert_eq!(host.compatibility(a, b).unwrap(), after);
        assert_eq!(pool.len(), 60);
    }

    #[test]
    fn test_empty_pool_restores_original_token() {
        let mut host = InMemoryHost::with_family_types();
        let a = host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        let b = host.spawn(CharacterKind::default(), Gender::Female, 28.0);

        let original = host.identity_token(b).unwrap();
        let mut pool = IdentityTokenPool { tokens: Vec::new() };
        pool.improve_edge(&mut host, a, b).unwrap();
        assert_eq!(host.identity_token(b).unwrap(), original);
    }

    #[test]
    fn test_displaced_token_returns_to_pool() {
        let mut host = InMemoryHost::with_family_types();
        let a = host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        let b = host.spawn(CharacterKind::default(), Gender::Female, 28.0);

        let original = host.identity_token(b).unwrap();
        let mut pool = IdentityTokenPool::allocate(&mut host, 200);
        let before = host.compatibility(a, b).unwrap();
        pool.improve_edge(&mut host, a, b).unwrap();

        if host.identity_token(b).unwrap() != original {
            // A swap happened, so the original token must be in the pool.
            assert!(pool.tokens.contains(&original));
            assert!(host.compatibility(a, b).unwrap() > before);
        }
    }
}
