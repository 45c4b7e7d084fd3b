use crate::core::RawPlaceItem;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct ParsedRecords {
    pub records: Vec<RawPlaceItem>,
    /// 结构上是数组元素、但解码失败被丢弃的条数
    pub dropped: usize,
}

/// 容错解析：整体解码失败时退回逐元素解码，坏记录不拖累同桶兄弟。
///
/// 只有连 JSON 数组结构都解析不出来时才返回 Err。
pub fn parse_records(bytes: &[u8]) -> Result<ParsedRecords> {
    if let Ok(records) = serde_json::from_slice::<Vec<RawPlaceItem>>(bytes) {
        return Ok(ParsedRecords {
            records,
            dropped: 0,
        });
    }

    let values: Vec<serde_json::Value> = serde_json::from_slice(bytes)?;
    let total = values.len();
    let records: Vec<RawPlaceItem> = values
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| match serde_json::from_value::<RawPlaceItem>(v) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::debug!("drop record #{}: {}", i, e);
                None
            }
        })
        .collect();

    Ok(ParsedRecords {
        dropped: total - records.len(),
        records,
    })
}
