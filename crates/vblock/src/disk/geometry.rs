//! CHS 几何推断
//!
//! 依次尝试：
//! 1. FAT 引导扇区的 BPB（含 FAT12/16 与 FAT32 两种扩展引导记录位置）；
//! 2. MBR 分区表中各分区起止 CHS 地址的最大磁头号与扇区号；
//! 3. 缺省值 255 磁头、63 扇区/磁道。
//!
//! 推断结果只写入磁盘上尚为 0 的字段。

use crate::config::{DEFAULT_HEADS, DEFAULT_SECTORS_PER_TRACK, SECTOR_SIZE};

use super::Disk;

const JMP_SHORT: u8 = 0xEB;
const JMP_NEAR: u8 = 0xE9;
const EXT_BOOT_SIG: u8 = 0x29;
const MBR_SIG: u16 = 0xAA55;
const PARTITION_TABLE: usize = 446;
const PARTITION_ENTRY_LEN: usize = 16;
const PARTITION_COUNT: usize = 4;

/// 几何来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometrySource {
    /// FAT BPB
    Fat,
    /// MBR 分区表
    Mbr,
    /// 缺省值
    Default,
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

/// FAT 引导扇区视图，调用者保证长度至少一个扇区
struct FatBootSector<'a>(&'a [u8]);

impl FatBootSector<'_> {
    fn jump(&self) -> u8 {
        self.0[0]
    }

    fn bytes_per_sector(&self) -> u16 {
        read_u16(self.0, 11)
    }

    fn media(&self) -> u8 {
        self.0[21]
    }

    fn fat_size16(&self) -> u16 {
        read_u16(self.0, 22)
    }

    fn sectors_per_track(&self) -> u16 {
        read_u16(self.0, 24)
    }

    fn heads(&self) -> u16 {
        read_u16(self.0, 26)
    }

    /// 扩展引导记录偏移：FAT12/16 在 36，FAT32 在 64
    fn ext_offset(&self) -> usize {
        if self.fat_size16() != 0 { 36 } else { 64 }
    }

    fn ext_boot_signature(&self) -> u8 {
        self.0[self.ext_offset() + 2]
    }

    fn fs_type(&self) -> &[u8] {
        let off = self.ext_offset() + 18;
        &self.0[off..off + 8]
    }

    fn is_valid(&self) -> bool {
        matches!(self.jump(), JMP_SHORT | JMP_NEAR)
            && self.bytes_per_sector() as usize == SECTOR_SIZE
            && (self.media() == 0xF0 || self.media() >= 0xF8)
            && (1..=63).contains(&self.sectors_per_track())
            && (1..=256).contains(&self.heads())
            && self.ext_boot_signature() == EXT_BOOT_SIG
            && self.fs_type().starts_with(b"FAT")
    }
}

/// 分区表项中的 CHS 地址
#[derive(Clone, Copy)]
struct Chs([u8; 3]);

impl Chs {
    fn head(&self) -> u16 {
        u16::from(self.0[0])
    }

    fn sector(&self) -> u16 {
        u16::from(self.0[1] & 0x3F)
    }
}

struct PartitionEntry<'a>(&'a [u8]);

impl PartitionEntry<'_> {
    fn status(&self) -> u8 {
        self.0[0]
    }

    fn chs_start(&self) -> Chs {
        Chs([self.0[1], self.0[2], self.0[3]])
    }

    fn partition_type(&self) -> u8 {
        self.0[4]
    }

    fn chs_end(&self) -> Chs {
        Chs([self.0[5], self.0[6], self.0[7]])
    }

    fn is_valid(&self) -> bool {
        self.status() & 0x7F == 0 && self.partition_type() != 0
    }
}

struct Mbr<'a>(&'a [u8]);

impl<'a> Mbr<'a> {
    fn signature(&self) -> u16 {
        read_u16(self.0, 510)
    }

    fn partitions(&self) -> impl Iterator<Item = PartitionEntry<'a>> + 'a {
        let buf = self.0;
        (0..PARTITION_COUNT).map(move |i| {
            let off = PARTITION_TABLE + i * PARTITION_ENTRY_LEN;
            PartitionEntry(&buf[off..off + PARTITION_ENTRY_LEN])
        })
    }

    /// 各有效分区起止地址中的最大磁头数（磁头号 + 1）与扇区号
    fn max_chs(&self) -> (u16, u16) {
        let mut heads = 0u16;
        let mut sectors = 0u16;
        for entry in self.partitions().filter(|entry| entry.is_valid()) {
            for chs in [entry.chs_start(), entry.chs_end()] {
                heads = heads.max(chs.head() + 1);
                sectors = sectors.max(chs.sector());
            }
        }
        (heads, sectors)
    }
}

/// 从首扇区推断 (磁头数, 每磁道扇区数)
///
/// 不足一个扇区时返回 `None`。
pub fn infer_chs(boot_sector: &[u8]) -> Option<(u32, u32, GeometrySource)> {
    if boot_sector.len() < SECTOR_SIZE {
        return None;
    }

    let mut heads = 0u32;
    let mut sectors = 0u32;
    let mut source = GeometrySource::Default;

    let fat = FatBootSector(boot_sector);
    if fat.is_valid() {
        heads = u32::from(fat.heads());
        sectors = u32::from(fat.sectors_per_track());
        source = GeometrySource::Fat;
    }

    let mbr = Mbr(boot_sector);
    if heads == 0 && sectors == 0 && mbr.signature() == MBR_SIG {
        let (h, s) = mbr.max_chs();
        heads = u32::from(h);
        sectors = u32::from(s);
        if (h, s) != (0, 0) {
            source = GeometrySource::Mbr;
        }
    }

    if heads == 0 {
        heads = DEFAULT_HEADS;
    }
    if sectors == 0 {
        sectors = DEFAULT_SECTORS_PER_TRACK;
    }
    Some((heads, sectors, source))
}

/// 根据首扇区推断几何并补全磁盘上未设置的字段
///
/// 柱面数按推断出的磁头数与扇区数计算。整个过程持有磁盘的搜索事件。
pub fn guess_geometry(boot_sector: &[u8], disk: &Disk) {
    let Some((heads, sectors, source)) = infer_chs(boot_sector) else {
        log::warn!("boot sector too short ({} bytes), geometry unchanged", boot_sector.len());
        return;
    };

    let _search = disk.search_event().hold();
    let cylinders = disk.lba_size() / (u64::from(heads) * u64::from(sectors));

    let mut geometry = disk.geometry_lock().lock();
    if geometry.heads == 0 {
        geometry.heads = heads;
    }
    if geometry.sectors_per_track == 0 {
        geometry.sectors_per_track = sectors;
    }
    if geometry.cylinders == 0 {
        geometry.cylinders = cylinders;
    }
    log::debug!(
        "disk {:?}: geometry {}/{}/{} ({:?})",
        disk.number(),
        geometry.cylinders,
        geometry.heads,
        geometry.sectors_per_track,
        source
    );
}

impl Disk {
    /// 根据首扇区补全几何，见 [`guess_geometry`]
    pub fn guess_geometry(&self, boot_sector: &[u8]) {
        guess_geometry(boot_sector, self);
    }
}
