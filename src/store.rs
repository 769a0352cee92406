//! 热点校准存储
//!
//! 固定容量的校准表：槽位数组 + 标识符索引。持久化时按槽位布局编码为
//! 定长字节镜像（每槽 48 字节：32 字节标识符 + 4 个小端 f32）。

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::algorithms::CalibrationRecord;
use crate::error::{StoreError, StoreResult};

/// 默认槽位数量
pub const DEFAULT_CAPACITY: usize = 12;

/// 标识符最大字节数
pub const MAX_IDENTIFIER_LEN: usize = 32;

/// 单个槽位的镜像字节数
pub const SLOT_SIZE: usize = MAX_IDENTIFIER_LEN + 4 * 4;

// ============================================================================
// 存储能力接口
// ============================================================================

/// 按标识符查询校准记录
pub trait CalibrationLookup {
    fn lookup(&self, id: &str) -> Option<CalibrationRecord>;
}

/// 可写的校准存储
pub trait CalibrationStore: CalibrationLookup {
    /// 写入记录；已存在的标识符原地覆盖，新标识符占用空槽
    fn upsert(&mut self, record: CalibrationRecord) -> StoreResult<()>;

    /// 枚举所有有效记录（过滤损坏条目）
    fn list(&self) -> Vec<CalibrationRecord>;

    /// 清空所有记录
    fn clear(&mut self) -> StoreResult<()>;
}

impl CalibrationLookup for HashMap<String, CalibrationRecord> {
    fn lookup(&self, id: &str) -> Option<CalibrationRecord> {
        self.get(id).cloned()
    }
}

// ============================================================================
// 内存校准表
// ============================================================================

/// 固定容量校准表
#[derive(Clone, Debug)]
pub struct BoundedCalibrationTable {
    slots: Vec<Option<CalibrationRecord>>,
    index: HashMap<String, usize>,
}

impl BoundedCalibrationTable {
    /// 创建默认容量（12）的空表
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        BoundedCalibrationTable {
            slots: vec![None; capacity],
            index: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 已占用槽位数量（含损坏条目）
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 从 JSON 数组批量导入校准记录（现场勘测结果）
    ///
    /// # 返回
    /// - 导入的记录数；遇到第一条写入失败的记录即停止
    pub fn import_json(&mut self, json: &str) -> StoreResult<usize> {
        let records: Vec<CalibrationRecord> = serde_json::from_str(json)?;
        let count = records.len();
        for record in records {
            self.upsert(record)?;
        }
        Ok(count)
    }

    /// 编码为定长字节镜像
    pub fn to_image(&self) -> Vec<u8> {
        let mut image = vec![0u8; self.capacity() * SLOT_SIZE];
        for (slot, chunk) in self.slots.iter().zip(image.chunks_exact_mut(SLOT_SIZE)) {
            if let Some(record) = slot {
                encode_slot(record, chunk);
            }
        }
        image
    }

    /// 从字节镜像恢复
    ///
    /// 标识符非空的槽位都视为已占用，即使内容损坏；损坏条目在 `list` 中被过滤。
    /// 同一标识符出现在多个槽位时只索引第一个，其余按损坏条目处理。
    pub fn from_image(image: &[u8], capacity: usize) -> StoreResult<Self> {
        let expected = capacity * SLOT_SIZE;
        if image.len() != expected {
            return Err(StoreError::CorruptImage {
                expected,
                actual: image.len(),
            });
        }

        let mut table = Self::with_capacity(capacity);
        for (slot, chunk) in image.chunks_exact(SLOT_SIZE).enumerate() {
            if let Some(record) = decode_slot(chunk) {
                if table.index.contains_key(&record.id) {
                    warn!(id = ?record.id, slot, "重复的标识符，按损坏条目处理");
                } else {
                    table.index.insert(record.id.clone(), slot);
                }
                table.slots[slot] = Some(record);
            }
        }
        Ok(table)
    }

    fn validate(record: &CalibrationRecord) -> StoreResult<()> {
        if record.id.is_empty() {
            return Err(StoreError::EmptyIdentifier);
        }
        if record.id.len() > MAX_IDENTIFIER_LEN {
            return Err(StoreError::IdentifierTooLong {
                len: record.id.len(),
                max: MAX_IDENTIFIER_LEN,
            });
        }
        if !is_printable_identifier(&record.id) {
            return Err(StoreError::InvalidRecord(format!(
                "标识符包含不可打印字符: {:?}",
                record.id
            )));
        }
        if !(record.x.is_finite() && record.y.is_finite() && record.rssi_at_1m.is_finite()) {
            return Err(StoreError::InvalidRecord(format!(
                "{}: 坐标或参考 RSSI 不是有限值",
                record.id
            )));
        }
        if !(record.path_loss_exponent.is_finite() && record.path_loss_exponent > 0.0) {
            return Err(StoreError::InvalidRecord(format!(
                "{}: 路径损耗指数必须大于 0",
                record.id
            )));
        }
        Ok(())
    }
}

impl Default for BoundedCalibrationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationLookup for BoundedCalibrationTable {
    fn lookup(&self, id: &str) -> Option<CalibrationRecord> {
        let slot = *self.index.get(id)?;
        self.slots[slot].as_ref().filter(|record| is_listable(record)).cloned()
    }
}

impl CalibrationStore for BoundedCalibrationTable {
    fn upsert(&mut self, record: CalibrationRecord) -> StoreResult<()> {
        Self::validate(&record)?;

        if let Some(&slot) = self.index.get(&record.id) {
            debug!(id = %record.id, slot, "更新已有热点");
            self.slots[slot] = Some(record);
            return Ok(());
        }

        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            warn!(id = %record.id, capacity = self.capacity(), "校准表已满");
            return Err(StoreError::StoreFull {
                capacity: self.capacity(),
            });
        };

        debug!(id = %record.id, slot, "写入新热点");
        self.index.insert(record.id.clone(), slot);
        self.slots[slot] = Some(record);
        Ok(())
    }

    fn list(&self) -> Vec<CalibrationRecord> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, record)| record.as_ref().map(|record| (slot, record)))
            .filter(|(slot, record)| {
                let valid = self.index.get(&record.id) == Some(slot) && is_listable(record);
                if !valid {
                    debug!(id = ?record.id, slot, "跳过损坏的校准条目");
                }
                valid
            })
            .map(|(_, record)| record.clone())
            .collect()
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.index.clear();
        info!("已清空所有热点");
        Ok(())
    }
}

/// 写入校验与读取过滤共用的标识符规则
fn is_printable_identifier(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| !c.is_control() && c != char::REPLACEMENT_CHARACTER)
}

fn is_listable(record: &CalibrationRecord) -> bool {
    is_printable_identifier(&record.id) && !record.x.is_nan() && !record.y.is_nan()
}

// ============================================================================
// 槽位编码
// ============================================================================

fn encode_slot(record: &CalibrationRecord, chunk: &mut [u8]) {
    let (id_bytes, values) = chunk.split_at_mut(MAX_IDENTIFIER_LEN);
    // 从损坏镜像恢复的标识符可能超长，按槽位截断
    let id = record.id.as_bytes();
    let len = id.len().min(MAX_IDENTIFIER_LEN);
    id_bytes[..len].copy_from_slice(&id[..len]);

    let fields = [record.x, record.y, record.rssi_at_1m, record.path_loss_exponent];
    for (value, out) in fields.iter().zip(values.chunks_exact_mut(4)) {
        out.copy_from_slice(&(*value as f32).to_le_bytes());
    }
}

fn decode_slot(chunk: &[u8]) -> Option<CalibrationRecord> {
    let (id_bytes, values) = chunk.split_at(MAX_IDENTIFIER_LEN);
    let id_len = id_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(MAX_IDENTIFIER_LEN);
    if id_len == 0 {
        return None;
    }
    let id = String::from_utf8_lossy(&id_bytes[..id_len]).into_owned();

    let mut fields = [0f64; 4];
    for (field, raw) in fields.iter_mut().zip(values.chunks_exact(4)) {
        *field = f64::from(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]));
    }
    let [x, y, rssi_at_1m, path_loss_exponent] = fields;

    Some(CalibrationRecord {
        id,
        x,
        y,
        rssi_at_1m,
        path_loss_exponent,
    })
}

// ============================================================================
// 文件持久化存储
// ============================================================================

/// 以字节镜像文件持久化的校准表
///
/// 每次修改都先写临时文件并落盘，再原子替换，断电后保留最近一次完整写入。
/// 写入失败时内存中的表保持不变。
#[derive(Debug)]
pub struct FileCalibrationStore {
    path: PathBuf,
    table: BoundedCalibrationTable,
}

impl FileCalibrationStore {
    /// 打开默认容量的镜像文件，不存在时创建空镜像
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_capacity(path, DEFAULT_CAPACITY)
    }

    pub fn open_with_capacity(path: impl AsRef<Path>, capacity: usize) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        match fs::read(&path) {
            Ok(image) => {
                let table = BoundedCalibrationTable::from_image(&image, capacity)?;
                info!(path = %path.display(), entries = table.len(), "已加载校准镜像");
                Ok(FileCalibrationStore { path, table })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let table = BoundedCalibrationTable::with_capacity(capacity);
                persist(&path, &table)?;
                let store = FileCalibrationStore { path, table };
                info!(path = %store.path.display(), "已创建空校准镜像");
                Ok(store)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &BoundedCalibrationTable {
        &self.table
    }

    /// 在副本上修改并落盘，成功后才替换内存中的表
    fn commit<F>(&mut self, change: F) -> StoreResult<()>
    where
        F: FnOnce(&mut BoundedCalibrationTable) -> StoreResult<()>,
    {
        let mut next = self.table.clone();
        change(&mut next)?;
        persist(&self.path, &next)?;
        self.table = next;
        Ok(())
    }
}

fn persist(path: &Path, table: &BoundedCalibrationTable) -> StoreResult<()> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(&table.to_image())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    sync_parent_dir(path)?;
    debug!(path = %path.display(), "校准镜像已写入");
    Ok(())
}

/// 目录项落盘，保证 rename 在断电后可见
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

impl CalibrationLookup for FileCalibrationStore {
    fn lookup(&self, id: &str) -> Option<CalibrationRecord> {
        self.table.lookup(id)
    }
}

impl CalibrationStore for FileCalibrationStore {
    fn upsert(&mut self, record: CalibrationRecord) -> StoreResult<()> {
        self.commit(|table| table.upsert(record))
    }

    fn list(&self) -> Vec<CalibrationRecord> {
        self.table.list()
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.commit(|table| table.clear())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, x: f64) -> CalibrationRecord {
        CalibrationRecord::new(id, x, 2.0, -40.0, 2.5)
    }

    #[test]
    fn test_upsert_then_lookup() {
        let mut table = BoundedCalibrationTable::new();
        table.upsert(record("AP-1", 1.0)).unwrap();
        assert_eq!(table.lookup("AP-1"), Some(record("AP-1", 1.0)));
        assert_eq!(table.lookup("AP-2"), None);
    }

    #[test]
    fn test_overwrite_in_place() {
        let mut table = BoundedCalibrationTable::with_capacity(2);
        table.upsert(record("A", 1.0)).unwrap();
        table.upsert(record("B", 2.0)).unwrap();
        table.upsert(record("A", 9.0)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("A").unwrap().x, 9.0);
        assert_eq!(table.list()[0].id, "A");
    }

    #[test]
    fn test_store_full() {
        let mut table = BoundedCalibrationTable::new();
        for i in 0..DEFAULT_CAPACITY {
            table.upsert(record(&format!("AP-{i}"), i as f64)).unwrap();
        }
        let err = table.upsert(record("AP-12", 0.0)).unwrap_err();
        assert!(matches!(err, StoreError::StoreFull { capacity: 12 }));
        // 已有标识符仍可覆盖
        table.upsert(record("AP-3", 33.0)).unwrap();
        assert_eq!(table.lookup("AP-3").unwrap().x, 33.0);
    }

    #[test]
    fn test_write_contract() {
        let mut table = BoundedCalibrationTable::new();
        assert!(matches!(
            table.upsert(record("", 0.0)),
            Err(StoreError::EmptyIdentifier)
        ));
        assert!(matches!(
            table.upsert(record(&"x".repeat(33), 0.0)),
            Err(StoreError::IdentifierTooLong { len: 33, max: 32 })
        ));
        assert!(table.upsert(record(&"x".repeat(32), 0.0)).is_ok());
        assert!(matches!(
            table.upsert(CalibrationRecord::new("AP", 0.0, 0.0, -40.0, 0.0)),
            Err(StoreError::InvalidRecord(_))
        ));
        assert!(matches!(
            table.upsert(CalibrationRecord::new("AP", f64::NAN, 0.0, -40.0, 2.0)),
            Err(StoreError::InvalidRecord(_))
        ));
        assert!(matches!(
            table.upsert(record("bad\0id", 0.0)),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_clear_frees_slots() {
        let mut table = BoundedCalibrationTable::with_capacity(1);
        table.upsert(record("A", 1.0)).unwrap();
        table.clear().unwrap();
        assert!(table.is_empty());
        assert_eq!(table.lookup("A"), None);
        table.upsert(record("B", 1.0)).unwrap();
        assert_eq!(table.list().len(), 1);
    }

    #[test]
    fn test_image_round_trip() {
        let mut table = BoundedCalibrationTable::with_capacity(3);
        table.upsert(CalibrationRecord::new("kitchen", 1.5, -2.25, -41.0, 2.75)).unwrap();
        table.upsert(CalibrationRecord::new("hall", 8.0, 4.0, -38.5, 3.0)).unwrap();

        let image = table.to_image();
        assert_eq!(image.len(), 3 * SLOT_SIZE);

        let restored = BoundedCalibrationTable::from_image(&image, 3).unwrap();
        assert_eq!(restored.list(), table.list());
        assert_eq!(restored.lookup("hall"), table.lookup("hall"));
    }

    #[test]
    fn test_image_length_mismatch() {
        let err = BoundedCalibrationTable::from_image(&[0u8; 10], 1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::CorruptImage { expected: 48, actual: 10 }
        ));
    }

    #[test]
    fn test_garbage_entries_filtered_from_list() {
        let mut table = BoundedCalibrationTable::with_capacity(3);
        table.upsert(record("good", 1.0)).unwrap();
        let mut image = table.to_image();

        // 槽位 1: 不可打印的标识符
        image[SLOT_SIZE] = 0x07;
        image[SLOT_SIZE + 1] = 0xFF;
        // 槽位 2: 正常标识符但坐标为 NaN
        let slot2 = 2 * SLOT_SIZE;
        image[slot2..slot2 + 3].copy_from_slice(b"nan");
        image[slot2 + MAX_IDENTIFIER_LEN..slot2 + MAX_IDENTIFIER_LEN + 4]
            .copy_from_slice(&f32::NAN.to_le_bytes());

        let restored = BoundedCalibrationTable::from_image(&image, 3).unwrap();
        let listed = restored.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "good");
        // 损坏条目仍占用槽位
        assert_eq!(restored.len(), 3);
    }

    #[test]
    fn test_replacement_character_rejected_at_write() {
        let mut table = BoundedCalibrationTable::new();
        assert!(matches!(
            table.upsert(record("caf\u{FFFD}", 1.0)),
            Err(StoreError::InvalidRecord(_))
        ));
        assert_eq!(table.lookup("caf\u{FFFD}"), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_identifier_in_image() {
        let mut table = BoundedCalibrationTable::with_capacity(3);
        table.upsert(record("AP", 1.0)).unwrap();
        let mut image = table.to_image();
        image.copy_within(0..SLOT_SIZE, SLOT_SIZE);

        let mut restored = BoundedCalibrationTable::from_image(&image, 3).unwrap();
        assert_eq!(restored.list(), vec![record("AP", 1.0)]);

        restored.upsert(record("AP", 9.0)).unwrap();
        assert_eq!(restored.list(), vec![record("AP", 9.0)]);
        assert_eq!(restored.lookup("AP"), Some(record("AP", 9.0)));
        // 重复槽位仍占用容量
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn test_lookup_skips_garbage_slot() {
        let mut table = BoundedCalibrationTable::with_capacity(1);
        table.upsert(record("hall", 1.0)).unwrap();
        let mut image = table.to_image();
        image[MAX_IDENTIFIER_LEN..MAX_IDENTIFIER_LEN + 4].copy_from_slice(&f32::NAN.to_le_bytes());

        let restored = BoundedCalibrationTable::from_image(&image, 1).unwrap();
        assert_eq!(restored.lookup("hall"), None);
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_import_json() {
        let mut table = BoundedCalibrationTable::new();
        let json = r#"[
            {"id": "A", "x": 0.0, "y": 0.0, "rssi_at_1m": -40.0, "path_loss_exponent": 2.0},
            {"id": "B", "x": 10.0, "y": 0.0, "rssi_at_1m": -42.0, "path_loss_exponent": 2.2}
        ]"#;
        assert_eq!(table.import_json(json).unwrap(), 2);
        assert_eq!(table.lookup("B").unwrap().rssi_at_1m, -42.0);

        assert!(matches!(
            table.import_json("not json"),
            Err(StoreError::Import(_))
        ));
    }

    #[test]
    fn test_hashmap_lookup() {
        let mut map = HashMap::new();
        map.insert("A".to_string(), record("A", 1.0));
        assert_eq!(map.lookup("A"), Some(record("A", 1.0)));
        assert_eq!(map.lookup("B"), None);
    }
}
