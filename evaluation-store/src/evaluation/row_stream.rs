use futures::{pin_mut, Stream, StreamExt};

use crate::errors::EvaluationStoreError;

/// Folds a stream of decoded rows into `acc` in a single forward pass.
///
/// Stops at the first error and drops whatever was accumulated; the error
/// is classified by how many rows were read before it.
pub async fn fold_rows<S, R, A, F>(
    rows: S,
    mut acc: A,
    mut fold: F,
) -> Result<A, EvaluationStoreError>
where
    S: Stream<Item = Result<R, sqlx::Error>>,
    F: FnMut(&mut A, R),
{
    pin_mut!(rows);

    let mut rows_read = 0usize;
    while let Some(row) = rows.next().await {
        let row = row.map_err(|e| EvaluationStoreError::from_row_error(e, rows_read))?;
        rows_read += 1;
        fold(&mut acc, row);
    }

    Ok(acc)
}
