//! Early-boot mount orchestrator for an A/B-updated embedded Linux device.
//!
//! Runs once, synchronously, immediately after the kernel hands off control:
//! stages `/proc`/`/sys` and the persistent partition, resolves the active
//! application slot from the boot-loader environment, materializes the
//! device-specific config files into a scratch `/etc`, composes the overlay
//! graph, and optionally expands the secure store. Exits 0 on best-effort
//! completion; non-zero only for errors that escape the orchestrator's own
//! tolerance envelope.

use std::path::PathBuf;

use bootslot_common::bootenv::{resolve_slot, UBootEnv};
use bootslot_common::config::CtrlConfig;
use bootslot_common::config_link;
use bootslot_common::memory::MemoryDetector;
use bootslot_common::mount::ReadOnlyOverlay;
use bootslot_common::orchestrator::Orchestrator;
use bootslot_common::paths;
use bootslot_common::preinit::{MountArgs, PreInit};
use xscript::Run;
use bootslot_common::scratch::ScratchOverlay;
use bootslot_common::secure_store::{self, SecureStoreSource};
use nix::mount::MsFlags;
use reportify::Report;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
enum TopError {
    #[error("preinit staging failed")]
    Preinit(#[source] bootslot_common::preinit::PreInitError),
    #[error("persistent-memory detection failed")]
    MemoryDetect(#[source] bootslot_common::memory::MemoryDetectError),
    #[error("boot-env reader unavailable")]
    BootEnv(#[source] bootslot_common::bootenv::BootEnvError),
    #[error("scratch overlay for /etc failed")]
    EtcScratch(#[source] bootslot_common::scratch::ScratchError),
    #[error("orchestrator construction failed")]
    Orchestrator(#[source] bootslot_common::orchestrator::OrchestratorError),
    #[error("configuration load failed")]
    Config(#[source] bootslot_common::config::ConfigError),
}

type TopResult<T> = Result<T, Report<TopError>>;

fn install_logging() {
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .event_format(format)
        .init();
}

fn stage_preinit(config: &CtrlConfig, preinit: &mut PreInit) -> TopResult<()> {
    let flags = MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC | MsFlags::MS_NODEV;
    preinit.add(MountArgs::new(None, "/proc", "proc", flags));
    preinit.add(MountArgs::new(None, "/sys", "sysfs", flags));
    preinit
        .prepare()
        .map_err(|report| Report::new(TopError::Preinit(report.into_error())))?;

    let detector = MemoryDetector::detect().map_err(|report| Report::new(TopError::MemoryDetect(report.into_error())))?;
    let device = detector
        .persistent_device_path(&config.persistent_data_label)
        .map_err(|report| Report::new(TopError::MemoryDetect(report.into_error())))?;

    std::fs::create_dir_all(&config.persistent_root).ok();
    preinit.add(MountArgs::new(
        device.to_str(),
        config.persistent_root.clone(),
        detector.memory_type().fs_type(),
        MsFlags::empty(),
    ));
    preinit
        .prepare()
        .map_err(|report| Report::new(TopError::Preinit(report.into_error())))?;

    Ok(())
}

fn prepare_etc_overlay(config: &CtrlConfig, boot_device: &str, memory_type: bootslot_common::memory::MemoryType) -> TopResult<ReadOnlyOverlay> {
    let scratch = ScratchOverlay::prepare(
        &config.etc_ramdisk_mountpoint,
        std::path::Path::new("/etc"),
        config.etc_ramdisk_size_mib,
    )
    .map_err(|report| Report::new(TopError::EtcScratch(report.into_error())))?;

    if let Err(report) = config_link::materialize_system_conf(
        memory_type,
        boot_device,
        &config.conf_dir,
        &PathBuf::from(paths::RAUC_SYSTEM_CONF_PATH),
    ) {
        warn!(error = ?report, "system.conf materialization failed, proceeding without it");
    }
    if let Err(report) = config_link::materialize_fw_env_config(
        memory_type,
        boot_device,
        &config.conf_dir,
        &PathBuf::from(paths::UBOOT_ENV_CONF_PATH),
        &config.mtd_uboot_env_partition_name,
    ) {
        warn!(error = ?report, "fw_env.config materialization failed, proceeding without it");
    }

    scratch
        .seal()
        .map_err(|report| Report::new(TopError::EtcScratch(report.into_error())))
}

fn load_boot_env() -> TopResult<UBootEnv> {
    match xscript::read_str!(["fw_printenv"]) {
        Ok(dump) => Ok(UBootEnv::parse_str(&dump)),
        Err(_) => UBootEnv::load("/run/bootslot/boot-env")
            .map_err(|report| Report::new(TopError::BootEnv(report.into_error()))),
    }
}

fn run() -> TopResult<bootslot_common::orchestrator::OrchestratorReport> {
    let config = CtrlConfig::load_default().map_err(|report| Report::new(TopError::Config(report.into_error())))?;

    let mut preinit = PreInit::new();
    stage_preinit(&config, &mut preinit)?;

    let detector = MemoryDetector::detect().map_err(|report| Report::new(TopError::MemoryDetect(report.into_error())))?;
    info!(memory_type = %detector.memory_type(), boot_device = detector.boot_device(), "persistent memory detected");

    let env = load_boot_env()?;
    let selected = resolve_slot(&env).map_err(|report| Report::new(TopError::BootEnv(report.into_error())))?;
    info!(slot = selected.0.as_str(), "boot slot resolved");

    let app_image_path = config.app_image_dir.join(selected.0.image_file_name());

    let etc_overlay = prepare_etc_overlay(&config, detector.boot_device(), detector.memory_type())?;
    let mut injected = vec![etc_overlay];

    let secure_store_source = match detector.memory_type() {
        bootslot_common::memory::MemoryType::Nand => SecureStoreSource::Mtd,
        bootslot_common::memory::MemoryType::Emmc => SecureStoreSource::Mmc,
    };
    match secure_store::extract_secure_store(
        secure_store_source,
        &detector,
        &config.mtd_secure_partition_name,
        &config.secure_store_default_archive,
        config.emmc_secure_part_blk_nr,
        &config.secure_store_json_config,
        &config.adu_ramdisk_mountpoint,
        &config.adu_target_dir,
        config.adu_ramdisk_size_mib,
    ) {
        Ok(overlay) => injected.push(overlay),
        Err(report) => warn!(error = ?report, "secure-store extraction failed, continuing without it"),
    }

    let mut orchestrator = Orchestrator::new().map_err(|report| Report::new(TopError::Orchestrator(report.into_error())))?;
    orchestrator
        .run(&app_image_path, &config.app_image_mount, &config.overlay_manifest_name, &injected)
        .map_err(|report| Report::new(TopError::Orchestrator(report.into_error())))
}

fn main() {
    install_logging();

    match run() {
        Ok(report) => {
            eprintln!(
                "bootslot-ctrl: boot complete (application image mounted: {}, application-folder overlays: {}, persistent overlays: {}, shed to minimal manifest: {})",
                report.application_image_mounted,
                report.application_folder_mounts,
                report.persistent_overlay_mounts,
                report.shed_to_minimal_manifest,
            );
            xscript::run!(["sync"]).ok();
        }
        Err(report) => {
            error!(error = ?report, "fatal error during boot assembly");
            eprintln!("bootslot-ctrl: fatal error, see log for details");
            std::process::exit(1);
        }
    }
}
