//! Alignment depth per recycling iteration.
//!
//! For each iteration, the rows of an alignment view are classified by which chain
//! they actually cover: rows with residues on both chains are *paired*, rows that
//! cover only one chain are *unpaired* for that chain. Three views are counted side
//! by side: the full alignment (`total`), the rows the model kept (`retained`) and
//! the rows it used as extra context (`extra`).

use crate::core::models::target::Target;
use ndarray::{ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix2, s};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Alignment token for a gap.
pub const GAP_TOKEN: i32 = 21;

/// Token used for rows added by shape padding.
pub const PADDING_TOKEN: i32 = 0;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Alignment view '{view}' has {width} columns, the chain layout needs {required}")]
    TooNarrow {
        view: AlignmentView,
        width: usize,
        required: usize,
    },

    #[error("Alignment view '{view}' has shape {shape:?}, expected {expected}")]
    Shape {
        view: AlignmentView,
        shape: Vec<usize>,
        expected: &'static str,
    },

    #[error("Alignment view '{view}' holds {available} recycling iterations, {requested} requested")]
    MissingIterations {
        view: AlignmentView,
        available: usize,
        requested: usize,
    },

    #[error("Failed to write statistics table: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentView {
    Total,
    Retained,
    Extra,
}

impl std::fmt::Display for AlignmentView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AlignmentView::Total => "total",
            AlignmentView::Retained => "retained",
            AlignmentView::Extra => "extra",
        })
    }
}

/// How alignment columns map onto the two chains being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLayout {
    /// Chain 1 spans `[0, first)`, chain 2 spans `[first, first + second)`.
    /// `second` is zero for single-chain targets.
    Heteromer { first: usize, second: usize },
    /// Chain 2 is the same columns as chain 1.
    Homomer { length: usize },
}

impl ChainLayout {
    /// Layout for a target: its first chain against all remaining chains.
    pub fn for_target(target: &Target, collapse_homomers: bool) -> Self {
        let lengths = target.chain_lengths();
        let first = lengths.first().copied().unwrap_or(0);
        if collapse_homomers && target.is_homodimer() {
            return ChainLayout::Homomer { length: first };
        }
        ChainLayout::Heteromer {
            first,
            second: lengths.iter().skip(1).sum(),
        }
    }

    pub fn required_width(&self) -> usize {
        match *self {
            ChainLayout::Heteromer { first, second } => first + second,
            ChainLayout::Homomer { length } => length,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewCounts {
    pub paired: usize,
    pub unpaired_chain_1: usize,
    pub unpaired_chain_2: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecyclingRow {
    pub recycle_num: usize,
    pub total: ViewCounts,
    pub retained: ViewCounts,
    pub extra: ViewCounts,
}

#[derive(Serialize)]
struct CsvRow {
    recycle_num: usize,
    total_paired: usize,
    total_unpaired_chain_1: usize,
    total_unpaired_chain_2: usize,
    paired: usize,
    unpaired_chain_1: usize,
    unpaired_chain_2: usize,
    extra_paired: usize,
    extra_unpaired_chain_1: usize,
    extra_unpaired_chain_2: usize,
}

impl From<&RecyclingRow> for CsvRow {
    fn from(row: &RecyclingRow) -> Self {
        Self {
            recycle_num: row.recycle_num,
            total_paired: row.total.paired,
            total_unpaired_chain_1: row.total.unpaired_chain_1,
            total_unpaired_chain_2: row.total.unpaired_chain_2,
            paired: row.retained.paired,
            unpaired_chain_1: row.retained.unpaired_chain_1,
            unpaired_chain_2: row.retained.unpaired_chain_2,
            extra_paired: row.extra.paired,
            extra_unpaired_chain_1: row.extra.unpaired_chain_1,
            extra_unpaired_chain_2: row.extra.unpaired_chain_2,
        }
    }
}

/// One row per recycling iteration, numbered from 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecyclingStats {
    rows: Vec<RecyclingRow>,
}

impl RecyclingStats {
    pub fn rows(&self) -> &[RecyclingRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps the first `n` iterations (those the model actually ran).
    pub fn truncated(&self, n: usize) -> Self {
        Self {
            rows: self.rows.iter().take(n).copied().collect(),
        }
    }

    pub fn write_csv(&self, writer: impl Write) -> Result<(), StatsError> {
        let mut csv = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv.serialize(CsvRow::from(row))?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<(), StatsError> {
        self.write_csv(File::create(path)?)
    }
}

fn is_present(columns: ArrayView1<'_, i32>) -> bool {
    !columns.iter().all(|&token| token == GAP_TOKEN)
}

fn count_view(
    msa: ArrayView2<'_, i32>,
    layout: ChainLayout,
    view: AlignmentView,
) -> Result<ViewCounts, StatsError> {
    let width = msa.ncols();
    let required = layout.required_width();
    if width < required {
        return Err(StatsError::TooNarrow {
            view,
            width,
            required,
        });
    }

    let mut counts = ViewCounts::default();
    for row in msa.rows() {
        if row.iter().all(|&token| token == PADDING_TOKEN) {
            continue;
        }
        let (has_1, has_2) = match layout {
            ChainLayout::Heteromer { first, second } => (
                is_present(row.slice(s![..first])),
                is_present(row.slice(s![first..first + second])),
            ),
            ChainLayout::Homomer { length } => {
                let present = is_present(row.slice(s![..length]));
                (present, present)
            }
        };
        let paired = has_1 && has_2;
        counts.paired += usize::from(paired);
        counts.unpaired_chain_1 += usize::from(has_1 && !paired);
        counts.unpaired_chain_2 += usize::from(has_2 && !paired);
    }
    Ok(counts)
}

fn iteration(
    msa: &ArrayD<i32>,
    view: AlignmentView,
    index: usize,
) -> Result<ArrayView2<'_, i32>, StatsError> {
    if msa.ndim() != 3 {
        return Err(StatsError::Shape {
            view,
            shape: msa.shape().to_vec(),
            expected: "[rows, columns, recycles]",
        });
    }
    let available = msa.len_of(Axis(2));
    if index >= available {
        return Err(StatsError::MissingIterations {
            view,
            available,
            requested: index + 1,
        });
    }
    to_matrix(msa.index_axis(Axis(2), index), view)
}

fn to_matrix(msa: ArrayViewD<'_, i32>, view: AlignmentView) -> Result<ArrayView2<'_, i32>, StatsError> {
    let shape = msa.shape().to_vec();
    msa.into_dimensionality::<Ix2>()
        .map_err(|_| StatsError::Shape {
            view,
            shape,
            expected: "[rows, columns]",
        })
}

/// Counts paired and unpaired rows of the three alignment views for iterations
/// `1..=recycle_count`.
///
/// `total` is the unprocessed alignment `[rows, columns]` and is counted identically
/// for every iteration; `retained` and `extra` carry a trailing recycling axis.
pub fn aggregate(
    total: &ArrayD<i32>,
    retained: &ArrayD<i32>,
    extra: &ArrayD<i32>,
    layout: ChainLayout,
    recycle_count: usize,
) -> Result<RecyclingStats, StatsError> {
    let total_counts = count_view(
        to_matrix(total.view(), AlignmentView::Total)?,
        layout,
        AlignmentView::Total,
    )?;

    let rows = (0..recycle_count)
        .map(|i| {
            Ok(RecyclingRow {
                recycle_num: i + 1,
                total: total_counts,
                retained: count_view(
                    iteration(retained, AlignmentView::Retained, i)?,
                    layout,
                    AlignmentView::Retained,
                )?,
                extra: count_view(
                    iteration(extra, AlignmentView::Extra, i)?,
                    layout,
                    AlignmentView::Extra,
                )?,
            })
        })
        .collect::<Result<Vec<_>, StatsError>>()?;

    Ok(RecyclingStats { rows })
}
