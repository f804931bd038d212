/// Row types mapping directly to SQLite rows. Flags are kept as raw JSON
/// text here; decoding happens in the query layer.
pub struct FollowerRow {
    pub document_id: String,
    pub account_id: String,
    pub flags: String,
}
