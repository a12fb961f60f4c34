//! Well-known paths used throughout the boot sequence.
//!
//! These mirror the layout a deployed image actually uses; [`CtrlConfig`](crate::config::CtrlConfig)
//! lets an operator override most of them, but every field defaults to the constant here.

/// Directory holding the two application images and the mounted current image.
pub const APP_IMAGE_DIR: &str = "/rw_fs/root/application";

/// Where the chosen application image is loop-mounted.
pub const APP_IMAGE_MOUNT: &str = "/rw_fs/root/application/current";

/// Name of the manifest file shipped inside the application image.
pub const OVERLAY_MANIFEST_NAME: &str = "overlay.ini";

/// Mountpoint of the persistent data partition/volume.
pub const PERSISTENT_ROOT: &str = "/rw_fs/root";

/// Default label searched for on the persistent data partition/volume.
pub const PERSISTENT_DATA_LABEL: &str = "data";

/// Directory holding config file templates and the materialized copies.
pub const CONF_DIR: &str = "/rw_fs/root/conf";

/// Destination of the materialized RAUC configuration.
pub const RAUC_SYSTEM_CONF_PATH: &str = "/etc/system.conf";

/// Destination of the materialized U-Boot environment tool configuration.
pub const UBOOT_ENV_CONF_PATH: &str = "/etc/fw_env.config";

/// Mountpoint of the scratch tmpfs backing the `/etc` overlay.
pub const ETC_RAMDISK_MOUNTPOINT: &str = "/run/bootslot/ramdisk-etc";

/// Mountpoint of the scratch tmpfs backing the secure-store `/adu` overlay.
pub const ADU_RAMDISK_MOUNTPOINT: &str = "/run/bootslot/ramdisk-adu";

/// Where the secure store is expanded.
pub const ADU_TARGET_DIR: &str = "/adu";

/// Name of the residue file left behind by an interrupted application update.
pub const TMP_APP_RESIDUE: &str = "tmp.app";

/// The sysfs node the memory detector checks first.
pub const SYSFS_BOOT_DEV: &str = "/sys/bdinfo/boot_dev";

/// Block number, in 512-byte sectors, of the secure store on the eMMC variant.
pub const EMMC_SECURE_PART_BLK_NR: u64 = 32768;

/// Name searched for in `/proc/mtd` for the MTD secure-store partition.
pub const MTD_SECURE_PARTITION_NAME: &str = "Secure";

/// Name searched for in `/proc/mtd` for the NAND U-Boot environment partition.
pub const MTD_UBOOT_ENV_PARTITION_NAME: &str = "UBootEnv";

/// Name of the updater configuration file materialized into `/etc`.
pub const SYSTEM_CONF_NAME: &str = "system.conf";

/// Name of the boot-env tool configuration file materialized into `/etc`.
pub const FW_ENV_CONF_NAME: &str = "fw_env.config";

/// Directory, relative to [`CONF_DIR`], holding the eMMC-specific templates.
pub const TEMPLATE_SUBDIR_EMMC: &str = "emmc";

/// Directory, relative to [`CONF_DIR`], holding the NAND-specific templates.
pub const TEMPLATE_SUBDIR_NAND: &str = "nand";

/// Size of the tmpfs backing the `/etc` scratch overlay.
pub const ETC_RAMDISK_SIZE_MIB: u64 = 16;

/// Size of the tmpfs backing the secure-store `/adu` scratch overlay.
pub const ADU_RAMDISK_SIZE_MIB: u64 = 16;

/// Default archive file consulted when no dedicated `"Secure"` MTD partition
/// exists (MTD variant fallback).
pub const SECURE_STORE_DEFAULT_ARCHIVE: &str = "/rw_fs/root/conf/adu.img";

/// Path of the secure-store agent-configuration JSON document.
pub const SECURE_STORE_JSON_CONFIG: &str = "/rw_fs/root/conf/adu-conf.json";

/// Canonical certificate path written into the agent configuration after a
/// successful extraction.
pub const SECURE_STORE_CANONICAL_CERT: &str = "/adu/certs/device.pem";

/// Canonical key path written into the agent configuration after a successful
/// extraction.
pub const SECURE_STORE_CANONICAL_KEY: &str = "/adu/certs/device.key";

/// Canonical container path written into the agent configuration after a
/// successful extraction.
pub const SECURE_STORE_CANONICAL_CONTAINER: &str = "/adu/certs/device.p12";

/// Expected `type` field of a well-formed [`crate::secure_store::SecureStoreHeader`].
pub const SECURE_STORE_HEADER_TYPE: &str = "CERT";

/// Cap on the number of application-folder overlays the orchestrator will
/// mount in one pass.
pub const MAX_APPLICATION_FOLDER_MOUNTS: usize = 8;

/// Substring the kernel's dmesg carries (and the errno we treat as equivalent)
/// when an overlay mount exceeds the maximum filesystem stacking depth.
pub const STACK_DEPTH_EXCEEDED_MESSAGE: &str = "maximum fs stacking depth exceeded";
