//! FlyWire grouped edge list, shipped as a feather (Arrow IPC) file.

use crate::error::{BuildError, BuildResult};
use arrow::array::{Array, AsArray, PrimitiveArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Int64Type};
use arrow::ipc::reader::FileReader;
use arrow::record_batch::RecordBatch;
use std::io::Cursor;

pub const PRE_COLUMN: &str = "pre_pt_root_id";
pub const POST_COLUMN: &str = "post_pt_root_id";
pub const WEIGHT_COLUMN: &str = "syn_count";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwEdge {
    pub pre: u64,
    pub post: u64,
    pub weight: u64,
}

pub fn decode_feather(bytes: &[u8]) -> BuildResult<Vec<FwEdge>> {
    let reader = FileReader::try_new(Cursor::new(bytes), None)
        .map_err(|e| BuildError::decode("FlyWire edges", e))?;
    let mut edges = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| BuildError::decode("FlyWire edges", e))?;
        let pre = int_column(&batch, PRE_COLUMN)?;
        let post = int_column(&batch, POST_COLUMN)?;
        let weight = int_column(&batch, WEIGHT_COLUMN)?;
        edges.reserve(batch.num_rows());
        for i in 0..batch.num_rows() {
            if pre.is_null(i) || post.is_null(i) || weight.is_null(i) {
                continue;
            }
            edges.push(FwEdge {
                pre: pre.value(i) as u64,
                post: post.value(i) as u64,
                weight: weight.value(i).max(0) as u64,
            });
        }
    }
    Ok(edges)
}

fn int_column(batch: &RecordBatch, name: &str) -> BuildResult<PrimitiveArray<Int64Type>> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| BuildError::decode("FlyWire edges", format!("missing column {name}")))?;
    let column = cast(column, &DataType::Int64)
        .map_err(|e| BuildError::decode("FlyWire edges", format!("column {name}: {e}")))?;
    Ok(column.as_primitive::<Int64Type>().clone())
}
