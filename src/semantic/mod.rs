//! Semantic classification
//!
//! Decides which imports are hardware-facing and which are Windows
//! scaffolding, then carries that verdict up to whole functions using the
//! UIR port-I/O summary produced by [`crate::uir::lift`]. A function with
//! any port I/O is kept outright; everything else currently falls back to
//! "not hardware" — see the module docs on [`AnalyzedFunction`] for why a
//! function that only calls a hardware API (no direct port I/O of its own)
//! is not yet recognized as hardware-relevant by this pass.

use crate::alloc::format;
use crate::alloc::string::String;
use crate::alloc::vec::Vec;
use crate::uir::Function as UirFunction;

/// Where a recognized API falls on the hardware/scaffolding spectrum. The
/// numeric ranges mirror the source table this was classified from:
/// hardware categories sit below `0x80`, scaffolding at or above it, and the
/// two hybrid categories above `0xC0` are deliberately excluded from both
/// [`Category::is_hardware`] and [`Category::is_scaffolding`] — they show up
/// on both hardware-facing and pure-scaffolding call paths often enough that
/// neither bucket is a fair characterization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Unknown = 0x00,

    PortIo = 0x10,
    Mmio = 0x11,
    Dma = 0x12,
    Interrupt = 0x13,
    Timing = 0x14,
    PciConfig = 0x15,

    Irp = 0x80,
    Pnp = 0x81,
    Power = 0x82,
    Wmi = 0x83,
    Registry = 0x84,
    MemoryMgr = 0x85,
    Sync = 0x86,
    String = 0x87,

    Object = 0xC0,
    IoMgr = 0xC1,
}

impl Category {
    pub fn is_hardware(self) -> bool {
        matches!(
            self,
            Category::PortIo
                | Category::Mmio
                | Category::Dma
                | Category::Interrupt
                | Category::Timing
                | Category::PciConfig
        )
    }

    pub fn is_scaffolding(self) -> bool {
        matches!(
            self,
            Category::Irp
                | Category::Pnp
                | Category::Power
                | Category::Wmi
                | Category::Registry
                | Category::MemoryMgr
                | Category::Sync
                | Category::String
        )
    }
}

/// One entry in the built-in API recognition table: a Windows API name, its
/// category, an optional Forth word it translates to directly, and a short
/// human-readable description used only for reporting.
struct ApiEntry {
    name: &'static str,
    category: Category,
    forth_equiv: Option<&'static str>,
    description: &'static str,
}

macro_rules! api {
    ($name:expr, $cat:expr, $forth:expr, $desc:expr) => {
        ApiEntry {
            name: $name,
            category: $cat,
            forth_equiv: $forth,
            description: $desc,
        }
    };
}

/// Recognized Windows driver APIs. Anything not in this table classifies as
/// [`Category::Unknown`].
static API_TABLE: &[ApiEntry] = &[
    // ---- Port I/O (HAL.DLL) — keep ----
    api!("READ_PORT_UCHAR", Category::PortIo, Some("C@-PORT"), "Read byte from port"),
    api!("READ_PORT_USHORT", Category::PortIo, Some("W@-PORT"), "Read word from port"),
    api!("READ_PORT_ULONG", Category::PortIo, Some("@-PORT"), "Read dword from port"),
    api!("WRITE_PORT_UCHAR", Category::PortIo, Some("C!-PORT"), "Write byte to port"),
    api!("WRITE_PORT_USHORT", Category::PortIo, Some("W!-PORT"), "Write word to port"),
    api!("WRITE_PORT_ULONG", Category::PortIo, Some("!-PORT"), "Write dword to port"),
    api!("READ_PORT_BUFFER_UCHAR", Category::PortIo, Some("C@N-PORT"), "Read N bytes from port"),
    api!("READ_PORT_BUFFER_USHORT", Category::PortIo, Some("W@N-PORT"), "Read N words from port"),
    api!("READ_PORT_BUFFER_ULONG", Category::PortIo, Some("@N-PORT"), "Read N dwords from port"),
    api!("WRITE_PORT_BUFFER_UCHAR", Category::PortIo, Some("C!N-PORT"), "Write N bytes to port"),
    api!("WRITE_PORT_BUFFER_USHORT", Category::PortIo, Some("W!N-PORT"), "Write N words to port"),
    api!("WRITE_PORT_BUFFER_ULONG", Category::PortIo, Some("!N-PORT"), "Write N dwords to port"),
    // ---- MMIO — keep ----
    api!("READ_REGISTER_UCHAR", Category::Mmio, Some("C@-MMIO"), "Read byte from MMIO"),
    api!("READ_REGISTER_USHORT", Category::Mmio, Some("W@-MMIO"), "Read word from MMIO"),
    api!("READ_REGISTER_ULONG", Category::Mmio, Some("@-MMIO"), "Read dword from MMIO"),
    api!("READ_REGISTER_ULONG64", Category::Mmio, Some("D@-MMIO"), "Read qword from MMIO"),
    api!("WRITE_REGISTER_UCHAR", Category::Mmio, Some("C!-MMIO"), "Write byte to MMIO"),
    api!("WRITE_REGISTER_USHORT", Category::Mmio, Some("W!-MMIO"), "Write word to MMIO"),
    api!("WRITE_REGISTER_ULONG", Category::Mmio, Some("!-MMIO"), "Write dword to MMIO"),
    api!("WRITE_REGISTER_ULONG64", Category::Mmio, Some("D!-MMIO"), "Write qword to MMIO"),
    api!("MmMapIoSpace", Category::Mmio, Some("MAP-PHYS"), "Map physical to virtual"),
    api!("MmUnmapIoSpace", Category::Mmio, Some("UNMAP-PHYS"), "Unmap MMIO region"),
    // ---- Timing — keep ----
    api!("KeStallExecutionProcessor", Category::Timing, Some("US-DELAY"), "Busy-wait microseconds"),
    api!("KeDelayExecutionThread", Category::Timing, Some("MS-DELAY"), "Sleep milliseconds"),
    api!("KeQueryPerformanceCounter", Category::Timing, Some("PERF-COUNT"), "Read perf counter"),
    api!("KeQuerySystemTime", Category::Timing, Some("SYS-TIME"), "Get system time"),
    // ---- DMA — keep ----
    api!("IoAllocateMdl", Category::Dma, Some("DMA-MDL"), "Allocate MDL"),
    api!("IoFreeMdl", Category::Dma, Some("DMA-FREE-MDL"), "Free MDL"),
    api!("MmBuildMdlForNonPagedPool", Category::Dma, Some("DMA-BUILD"), "Build MDL"),
    api!("MmGetPhysicalAddress", Category::Dma, Some("VIRT>PHYS"), "Get physical address"),
    api!("MmAllocateContiguousMemory", Category::Dma, Some("DMA-ALLOC"), "Allocate contiguous"),
    api!("MmFreeContiguousMemory", Category::Dma, Some("DMA-FREE"), "Free contiguous"),
    api!("IoGetDmaAdapter", Category::Dma, Some("DMA-ADAPTER"), "Get DMA adapter"),
    api!("AllocateCommonBuffer", Category::Dma, Some("DMA-BUFFER"), "Allocate DMA buffer"),
    api!("FreeCommonBuffer", Category::Dma, Some("DMA-UNBUFFER"), "Free DMA buffer"),
    // ---- Interrupt — keep ----
    api!("IoConnectInterrupt", Category::Interrupt, Some("IRQ-CONNECT"), "Connect ISR"),
    api!("IoDisconnectInterrupt", Category::Interrupt, Some("IRQ-DISCONNECT"), "Disconnect ISR"),
    api!("KeSynchronizeExecution", Category::Interrupt, Some("IRQ-SYNC"), "Sync with ISR"),
    api!("IoRequestDpc", Category::Interrupt, Some("DPC-REQUEST"), "Request DPC"),
    api!("KeInsertQueueDpc", Category::Interrupt, Some("DPC-QUEUE"), "Queue DPC"),
    // ---- PCI config — keep ----
    api!("HalGetBusData", Category::PciConfig, Some("PCI-READ"), "Read PCI config"),
    api!("HalGetBusDataByOffset", Category::PciConfig, Some("PCI-READ@"), "Read PCI at offset"),
    api!("HalSetBusData", Category::PciConfig, Some("PCI-WRITE"), "Write PCI config"),
    api!("HalSetBusDataByOffset", Category::PciConfig, Some("PCI-WRITE@"), "Write PCI at offset"),
    // ---- IRP — filter ----
    api!("IoCompleteRequest", Category::Irp, None, "Complete IRP"),
    api!("IoCallDriver", Category::Irp, None, "Call lower driver"),
    api!("IoSkipCurrentIrpStackLocation", Category::Irp, None, "Skip IRP stack"),
    api!("IoCopyCurrentIrpStackLocationToNext", Category::Irp, None, "Copy IRP stack"),
    api!("IoGetCurrentIrpStackLocation", Category::Irp, None, "Get IRP stack"),
    api!("IoMarkIrpPending", Category::Irp, None, "Mark IRP pending"),
    api!("IoSetCompletionRoutine", Category::Irp, None, "Set completion"),
    api!("IoAllocateIrp", Category::Irp, None, "Allocate IRP"),
    api!("IoFreeIrp", Category::Irp, None, "Free IRP"),
    api!("IoBuildDeviceIoControlRequest", Category::Irp, None, "Build IOCTL IRP"),
    api!("IoBuildSynchronousFsdRequest", Category::Irp, None, "Build sync IRP"),
    // ---- PnP — filter ----
    api!("IoRegisterDeviceInterface", Category::Pnp, None, "Register interface"),
    api!("IoSetDeviceInterfaceState", Category::Pnp, None, "Set interface state"),
    api!("IoOpenDeviceRegistryKey", Category::Pnp, None, "Open device registry"),
    api!("IoGetDeviceProperty", Category::Pnp, None, "Get device property"),
    api!("IoInvalidateDeviceRelations", Category::Pnp, None, "Invalidate relations"),
    api!("IoReportTargetDeviceChange", Category::Pnp, None, "Report device change"),
    // ---- Power — filter ----
    api!("PoRequestPowerIrp", Category::Power, None, "Request power IRP"),
    api!("PoSetPowerState", Category::Power, None, "Set power state"),
    api!("PoCallDriver", Category::Power, None, "Call power driver"),
    api!("PoStartNextPowerIrp", Category::Power, None, "Start next power IRP"),
    api!("PoRegisterDeviceForIdleDetection", Category::Power, None, "Register idle"),
    // ---- Memory manager — filter ----
    api!("ExAllocatePool", Category::MemoryMgr, None, "Allocate pool"),
    api!("ExAllocatePoolWithTag", Category::MemoryMgr, None, "Allocate tagged pool"),
    api!("ExFreePool", Category::MemoryMgr, None, "Free pool"),
    api!("ExFreePoolWithTag", Category::MemoryMgr, None, "Free tagged pool"),
    api!("MmProbeAndLockPages", Category::MemoryMgr, None, "Lock pages"),
    api!("MmUnlockPages", Category::MemoryMgr, None, "Unlock pages"),
    // ---- Sync — filter ----
    api!("KeInitializeSpinLock", Category::Sync, None, "Init spinlock"),
    api!("KeAcquireSpinLock", Category::Sync, None, "Acquire spinlock"),
    api!("KeReleaseSpinLock", Category::Sync, None, "Release spinlock"),
    api!("KeWaitForSingleObject", Category::Sync, None, "Wait single"),
    api!("ExAcquireFastMutex", Category::Sync, None, "Acquire fast mutex"),
    api!("ExReleaseFastMutex", Category::Sync, None, "Release fast mutex"),
];

fn find_entry(func_name: &str) -> Option<&'static ApiEntry> {
    API_TABLE.iter().find(|e| e.name == func_name)
}

/// Classify a single import name. Returns `Category::Unknown` with no Forth
/// equivalent for anything not in the built-in table.
pub fn classify_import(func_name: &str) -> (Category, Option<&'static str>) {
    match find_entry(func_name) {
        Some(entry) => (entry.category, entry.forth_equiv),
        None => (Category::Unknown, None),
    }
}

/// The one-line description the built-in table carries for a recognized
/// API, for use in reports. `None` for unrecognized names.
pub fn describe_import(func_name: &str) -> Option<&'static str> {
    find_entry(func_name).map(|e| e.description)
}

/// A PE import, classified against the built-in API table.
#[derive(Debug, Clone)]
pub struct ClassifiedImport {
    pub dll_name: String,
    pub func_name: String,
    pub category: Category,
    pub forth_equiv: Option<&'static str>,
    pub iat_rva: u32,
}

/// Classify a batch of imports in one pass.
pub fn classify_imports(imports: &[crate::pe::import::Import]) -> Vec<ClassifiedImport> {
    imports
        .iter()
        .map(|imp| {
            let (category, forth_equiv) = classify_import(&imp.func_name);
            ClassifiedImport {
                dll_name: imp.dll_name.clone(),
                func_name: imp.func_name.clone(),
                category,
                forth_equiv,
                iat_rva: imp.iat_rva,
            }
        })
        .collect()
}

/// A lifted function, classified as hardware-relevant or not.
///
/// The only signal currently used is the UIR's own `has_port_io` flag — a
/// function is hardware-relevant if it issues IN/OUT directly. A function
/// that only *calls* a hardware API (e.g. `READ_PORT_UCHAR` via the IAT)
/// without any inline port I/O of its own is not yet recognized as
/// hardware-relevant here, since that requires matching the function's call
/// targets against the IAT and classified imports, which this pass does not
/// do. Such wrapper functions currently classify as scaffolding even when
/// they exist purely to reach hardware.
#[derive(Debug, Clone)]
pub struct AnalyzedFunction {
    pub address: u64,
    pub name: String,
    pub primary_category: Category,
    pub has_port_io: bool,
    pub is_hardware: bool,
    pub ports: Vec<u16>,
}

/// Classify a batch of lifted functions. `names` supplies an export name per
/// function by entry address, where known; functions without one get a
/// synthesized `func_<addr>` name.
pub fn analyze_functions(
    functions: &[(u64, &UirFunction)],
    names: &dyn Fn(u64) -> Option<String>,
) -> Vec<AnalyzedFunction> {
    functions
        .iter()
        .map(|(addr, uf)| {
            let name = names(*addr).unwrap_or_else(|| format!("func_{:X}", addr));

            let mut ports: Vec<u16> = Vec::new();
            for &p in &uf.ports_read {
                if !ports.contains(&p) {
                    ports.push(p);
                }
            }
            for &p in &uf.ports_written {
                if !ports.contains(&p) {
                    ports.push(p);
                }
            }

            let (primary_category, is_hardware) = if uf.has_port_io {
                (Category::PortIo, true)
            } else {
                (Category::Unknown, false)
            };

            AnalyzedFunction {
                address: *addr,
                name,
                primary_category,
                has_port_io: uf.has_port_io,
                is_hardware,
                ports,
            }
        })
        .collect()
}

/// Render a human-readable text report mirroring the shape of a
/// conventional static-analysis summary: import counts by category, then
/// per-function hardware/scaffolding verdicts with their ports.
pub fn report(imports: &[ClassifiedImport], functions: &[AnalyzedFunction]) -> String {
    let mut out = String::new();
    out.push_str("Semantic Analysis Report\n");
    out.push_str("========================\n\n");

    if !imports.is_empty() {
        let hw = imports.iter().filter(|i| i.category.is_hardware()).count();
        let scaf = imports.iter().filter(|i| i.category.is_scaffolding()).count();
        out.push_str(&format!(
            "Imports: {} total, {} hardware, {} scaffolding, {} unknown\n",
            imports.len(),
            hw,
            scaf,
            imports.len() - hw - scaf
        ));

        out.push_str("\n  Hardware APIs:\n");
        for i in imports.iter().filter(|i| i.category.is_hardware()) {
            out.push_str(&format!(
                "    {:<35} -> {}\n",
                i.func_name,
                i.forth_equiv.unwrap_or("?")
            ));
        }

        out.push_str("\n  Scaffolding APIs (filtered):\n");
        for i in imports.iter().filter(|i| i.category.is_scaffolding()) {
            out.push_str(&format!("    {}\n", i.func_name));
        }
    }

    let hw_count = functions.iter().filter(|f| f.is_hardware).count();
    out.push_str(&format!(
        "\nFunctions: {} total, {} hardware, {} filtered\n",
        functions.len(),
        hw_count,
        functions.len() - hw_count
    ));

    for f in functions {
        out.push_str(&format!(
            "  {} @ {:#X}: {}",
            f.name,
            f.address,
            if f.is_hardware { "HARDWARE" } else { "scaffolding" }
        ));
        if !f.ports.is_empty() {
            out.push_str(" (ports:");
            for p in &f.ports {
                out.push_str(&format!(" {:#X}", p));
            }
            out.push(')');
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_port_io_api_with_forth_equivalent() {
        let (cat, forth) = classify_import("READ_PORT_UCHAR");
        assert_eq!(cat, Category::PortIo);
        assert_eq!(forth, Some("C@-PORT"));
        assert!(cat.is_hardware());
    }

    #[test]
    fn recognizes_scaffolding_api_with_no_forth_equivalent() {
        let (cat, forth) = classify_import("IoCompleteRequest");
        assert_eq!(cat, Category::Irp);
        assert_eq!(forth, None);
        assert!(cat.is_scaffolding());
    }

    #[test]
    fn unknown_name_classifies_as_unknown() {
        let (cat, forth) = classify_import("SomeRandomUnrecognizedExport");
        assert_eq!(cat, Category::Unknown);
        assert_eq!(forth, None);
        assert!(!cat.is_hardware());
        assert!(!cat.is_scaffolding());
    }

    #[test]
    fn function_with_port_io_is_hardware() {
        let mut dec = crate::decoder::Decoder::new(&[0xE4, 0x60, 0xC3], 0);
        let insts = dec.decode_range();
        let func = crate::uir::lift(&insts, 0).unwrap();
        let analyzed = analyze_functions(&[(0, &func)], &|_| None);
        assert_eq!(analyzed.len(), 1);
        assert!(analyzed[0].is_hardware);
        assert_eq!(analyzed[0].name, "func_0");
        assert_eq!(analyzed[0].ports, alloc_vec_u16(&[0x60]));
    }

    #[test]
    fn function_without_port_io_is_not_hardware() {
        let mut dec = crate::decoder::Decoder::new(&[0x90, 0xC3], 0);
        let insts = dec.decode_range();
        let func = crate::uir::lift(&insts, 0).unwrap();
        let analyzed = analyze_functions(&[(0, &func)], &|_| None);
        assert!(!analyzed[0].is_hardware);
    }

    fn alloc_vec_u16(v: &[u16]) -> Vec<u16> {
        v.to_vec()
    }
}
