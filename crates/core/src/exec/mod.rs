//! The cooperative executor behind every composite.
//!
//! One task walks the lowered tree; the transport's own executor completes
//! the futures it hands back. Sequences await each result before submitting
//! the next statement; groups submit a wave, await every member, then move
//! on. Cancellation and the composite-wide deadline are checked at every
//! suspension point.

use crate::cql::PhysicalStatement;
use crate::error::Error;
use crate::session::Session;
use crate::statement::Lowered;
use crate::transport::RawResultSet;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

pub(crate) struct ExecControl {
    pub(crate) cancel: CancellationToken,
    pub(crate) deadline: Option<tokio::time::Instant>,
    pub(crate) default_parallel: usize,
}

impl ExecControl {
    /// Races `fut` against cancellation and the remaining deadline.
    ///
    /// The deadline is recomputed from the absolute instant at every call,
    /// so a slow early leaf shrinks the budget of every later one.
    pub(crate) async fn guard<R>(&self, fut: impl std::future::Future<Output = Result<R, Error>>) -> Result<R, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.deadline {
            None => {
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(Error::Cancelled),
                    result = fut => result,
                }
            }
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(Error::Cancelled),
                    result = tokio::time::timeout_at(deadline, fut) => match result {
                        Ok(inner) => inner,
                        Err(_) => Err(Error::Timeout),
                    },
                }
            }
        }
    }
}

/// Splits a group's children into waves.
///
/// Children accumulate until the wave reaches `parallel` members or the
/// next child is a sequence — a sequence always runs as a singleton wave,
/// acting as a barrier.
pub(crate) fn waves<'p>(children: &'p [Lowered], parallel: usize) -> Vec<Vec<&'p Lowered>> {
    let parallel = parallel.max(1);
    let mut out: Vec<Vec<&Lowered>> = Vec::new();
    let mut current: Vec<&Lowered> = Vec::new();
    for child in children {
        if matches!(child, Lowered::Sequence(_)) {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            out.push(vec![child]);
            continue;
        }
        current.push(child);
        if current.len() >= parallel {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Executes one lowered tree, returning every statement's result in plan
/// order.
pub(crate) fn execute_lowered<'a>(
    session: &'a Session,
    plan: &'a Lowered,
    ctl: &'a ExecControl,
) -> BoxFuture<'a, Result<Vec<Box<dyn RawResultSet>>, Error>> {
    async move {
        match plan {
            Lowered::Statement(stmt) => {
                let result = ctl.guard(execute_statement(session, stmt)).await?;
                Ok(vec![result])
            }
            Lowered::Sequence(children) => {
                let mut results = Vec::new();
                for child in children {
                    // The previous leaf's result gates the next submission.
                    results.append(&mut execute_lowered(session, child, ctl).await?);
                }
                Ok(results)
            }
            Lowered::Group {
                children,
                parallel_factor,
            } => {
                let parallel = parallel_factor.unwrap_or(ctl.default_parallel);
                let mut results = Vec::new();
                for wave in waves(children, parallel) {
                    let outcomes = join_all(wave.iter().map(|&child| execute_lowered(session, child, ctl))).await;
                    let mut first_error = None;
                    for outcome in outcomes {
                        match outcome {
                            Ok(mut sets) => results.append(&mut sets),
                            Err(error) if first_error.is_none() => first_error = Some(error),
                            Err(error) => {
                                tracing::warn!(%error, "discarding secondary error in wave");
                            }
                        }
                    }
                    if let Some(error) = first_error {
                        // Completed waves stay applied; nothing is rolled back.
                        return Err(error);
                    }
                }
                Ok(results)
            }
        }
    }
    .boxed()
}

async fn execute_statement(session: &Session, stmt: &PhysicalStatement) -> Result<Box<dyn RawResultSet>, Error> {
    tracing::trace!(cql = %stmt.cql, keyspace = %stmt.keyspace, "executing");
    session.transport().execute(stmt).await.map_err(|error| {
        if stmt.kind.is_read() {
            Error::from_execution_on_read(error)
        } else {
            Error::Execution(error)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::StatementKind;

    fn leaf(name: &str) -> Lowered {
        Lowered::Statement(PhysicalStatement::new(StatementKind::Select, "ks", name))
    }

    fn seq(children: Vec<Lowered>) -> Lowered {
        Lowered::Sequence(children)
    }

    #[test]
    fn waves_split_on_capacity() {
        let children = vec![leaf("a"), leaf("b"), leaf("c"), leaf("d"), leaf("e")];
        let split = waves(&children, 2);
        let sizes: Vec<usize> = split.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn a_sequence_closes_the_current_wave() {
        let children = vec![leaf("a"), leaf("b"), seq(vec![leaf("c"), leaf("d")]), leaf("e"), leaf("f")];
        let split = waves(&children, 3);
        let sizes: Vec<usize> = split.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1, 2]);
        assert!(matches!(split[1][0], Lowered::Sequence(_)));
    }

    #[test]
    fn parallel_factor_one_is_fully_sequential() {
        let children = vec![leaf("a"), leaf("b"), leaf("c")];
        let split = waves(&children, 1);
        assert_eq!(split.len(), 3);
    }

    proptest::proptest! {
        /// Waves partition the children, preserve order, never exceed the
        /// factor, and isolate sequences.
        #[test]
        fn waves_partition_and_bound(layout in proptest::collection::vec(proptest::bool::ANY, 0..40), factor in 1usize..8) {
            let children: Vec<Lowered> = layout
                .iter()
                .map(|&is_seq| if is_seq { seq(vec![leaf("s")]) } else { leaf("l") })
                .collect();
            let split = waves(&children, factor);

            let total: usize = split.iter().map(Vec::len).sum();
            proptest::prop_assert_eq!(total, children.len());
            for wave in &split {
                proptest::prop_assert!(wave.len() <= factor);
                if wave.iter().any(|c| matches!(c, Lowered::Sequence(_))) {
                    proptest::prop_assert_eq!(wave.len(), 1);
                }
            }
            // Flattening the waves yields the original order.
            let flattened: Vec<*const Lowered> = split.iter().flatten().map(|c| *c as *const Lowered).collect();
            let original: Vec<*const Lowered> = children.iter().map(|c| c as *const Lowered).collect();
            proptest::prop_assert_eq!(flattened, original);
        }
    }
}
