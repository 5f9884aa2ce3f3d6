//! Dynamic policy subsystem - compiles submitted tactic source at runtime
//! and loads it behind the [`Policy`](super::Policy) contract
//!
//! A submission is a Rust fragment defining `struct UserPolicy` (with
//! `Default`) and `impl Tactic for UserPolicy`. The engine prepends a
//! self-contained contract prelude, compiles the result with the host
//! `rustc` into a cdylib inside a fresh temporary directory, and loads it
//! through a small versioned C-ABI shim. Each registration owns its build
//! directory and library, so discarding the record discards everything the
//! submission brought along.

use std::ffi::c_void;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use tracing::{info, warn};

use crate::game::Action;

use super::{Loadout, Policy, ProjectileView, VehicleView};

/// Bumped whenever the shim contract changes; checked at load time
pub const ABI_VERSION: u32 = 1;

const NAME_BUF_CAP: usize = 256;

// ---------------------------------------------------------------------------
// ABI types, mirrored verbatim in the generated prelude
// ---------------------------------------------------------------------------

#[repr(C)]
struct AbiVehicle {
    id: [u8; 16],
    x: f64,
    y: f64,
    heading_deg: f64,
    speed: f64,
    health: i32,
    max_health: i32,
    alive: u8,
    can_shoot: u8,
    ammo: u32,
}

impl AbiVehicle {
    fn from_view(v: &VehicleView) -> Self {
        Self {
            id: *v.id.as_bytes(),
            x: v.x,
            y: v.y,
            heading_deg: v.heading_deg,
            speed: v.speed,
            health: v.health,
            max_health: v.max_health,
            alive: v.alive as u8,
            can_shoot: v.can_shoot as u8,
            ammo: v.ammo,
        }
    }
}

#[repr(C)]
struct AbiProjectile {
    owner_id: [u8; 16],
    x: f64,
    y: f64,
    heading_deg: f64,
    speed: f64,
}

impl AbiProjectile {
    fn from_view(p: &ProjectileView) -> Self {
        Self {
            owner_id: *p.owner_id.as_bytes(),
            x: p.x,
            y: p.y,
            heading_deg: p.heading_deg,
            speed: p.speed,
        }
    }
}

#[repr(C)]
struct AbiAction {
    kind: u32,
    power: f64,
}

impl AbiAction {
    fn decode(&self) -> Action {
        let power = if self.power.is_finite() {
            self.power.clamp(0.0, 1.0)
        } else {
            0.0
        };
        match self.kind {
            1 => Action::MoveForward { power },
            2 => Action::MoveBackward { power },
            3 => Action::TurnLeft { power },
            4 => Action::TurnRight { power },
            5 => Action::Shoot,
            _ => Action::Idle,
        }
    }
}

type AbiVersionFn = unsafe extern "C" fn() -> u32;
type CreateFn = unsafe extern "C" fn() -> *mut c_void;
type DestroyFn = unsafe extern "C" fn(*mut c_void);
type NameFn = unsafe extern "C" fn(*mut c_void, *mut u8, usize) -> isize;
type LoadoutFn = unsafe extern "C" fn(*mut c_void, *mut u8) -> i32;
type DecideFn = unsafe extern "C" fn(
    *mut c_void,
    *const AbiVehicle,
    *const AbiVehicle,
    *const AbiProjectile,
    usize,
    *mut AbiAction,
) -> i32;

#[derive(Clone, Copy)]
struct PluginVtable {
    create: CreateFn,
    destroy: DestroyFn,
    name: NameFn,
    loadout: LoadoutFn,
    decide: DecideFn,
}

/// Failures of the compile-and-load pipeline.
///
/// `ToolchainUnavailable` is deliberately distinct from `Build`: a missing
/// compiler is an operator problem, not a defect in the submitted source.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("rust toolchain unavailable: {0}")]
    ToolchainUnavailable(String),

    #[error("policy source failed to compile")]
    Build { diagnostics: String },

    #[error("compiled policy could not be loaded: {0}")]
    Load(String),

    #[error("build directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// A successfully compiled and loaded submission.
///
/// Owns the dynamic library and its ephemeral build directory; both are
/// discarded together when the last reference (registry record or running
/// match) goes away, so nothing survives a delete or a process restart.
pub struct PluginArtifact {
    vtable: PluginVtable,
    _lib: libloading::Library,
    _build_dir: tempfile::TempDir,
}

// raw fn pointers into the kept-alive library
unsafe impl Send for PluginArtifact {}
unsafe impl Sync for PluginArtifact {}

impl PluginArtifact {
    /// Create a fresh policy instance from this artifact. Every match gets
    /// its own instance; artifacts themselves are stateless.
    pub fn instantiate(artifact: &Arc<Self>) -> Result<LoadedPolicy, CompileError> {
        let handle = unsafe { (artifact.vtable.create)() };
        if handle.is_null() {
            return Err(CompileError::Load(
                "policy constructor returned null".to_string(),
            ));
        }

        let mut name_buf = [0u8; NAME_BUF_CAP];
        let written =
            unsafe { (artifact.vtable.name)(handle, name_buf.as_mut_ptr(), NAME_BUF_CAP) };
        let name = if written > 0 {
            String::from_utf8_lossy(&name_buf[..written as usize]).into_owned()
        } else {
            "dynamic policy".to_string()
        };

        let mut loadout_buf = [1u8; 3];
        let rc = unsafe { (artifact.vtable.loadout)(handle, loadout_buf.as_mut_ptr()) };
        let loadout = if rc == 0 {
            Loadout::new(loadout_buf[0], loadout_buf[1], loadout_buf[2])
        } else {
            Loadout::default()
        };

        Ok(LoadedPolicy {
            artifact: Arc::clone(artifact),
            handle,
            name,
            loadout,
        })
    }
}

/// One live instance of a dynamically loaded policy
pub struct LoadedPolicy {
    artifact: Arc<PluginArtifact>,
    handle: *mut c_void,
    name: String,
    loadout: Loadout,
}

// the handle is only ever used from one thread at a time (the guard worker)
unsafe impl Send for LoadedPolicy {}

impl Policy for LoadedPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn loadout(&self) -> Loadout {
        self.loadout
    }

    fn decide(
        &mut self,
        me: &VehicleView,
        opponent: Option<&VehicleView>,
        projectiles: &[ProjectileView],
    ) -> Action {
        let me_abi = AbiVehicle::from_view(me);
        let opponent_abi = opponent.map(AbiVehicle::from_view);
        let shots: Vec<AbiProjectile> =
            projectiles.iter().map(AbiProjectile::from_view).collect();

        let mut out = AbiAction {
            kind: 0,
            power: 0.0,
        };
        let rc = unsafe {
            (self.artifact.vtable.decide)(
                self.handle,
                &me_abi,
                opponent_abi
                    .as_ref()
                    .map_or(std::ptr::null(), |o| o as *const _),
                shots.as_ptr(),
                shots.len(),
                &mut out,
            )
        };
        if rc != 0 {
            // plugin-side failure boundary tripped; degrade quietly
            return Action::Idle;
        }
        out.decode()
    }
}

impl Drop for LoadedPolicy {
    fn drop(&mut self) {
        unsafe { (self.artifact.vtable.destroy)(self.handle) };
    }
}

/// Compiles submissions with the host toolchain
pub struct PolicyCompiler {
    rustc: PathBuf,
}

impl PolicyCompiler {
    /// Use `$RUSTC` when set, otherwise whatever `rustc` resolves to
    pub fn from_env() -> Self {
        Self {
            rustc: std::env::var_os("RUSTC")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("rustc")),
        }
    }

    /// Probe the toolchain without compiling anything
    pub fn check_toolchain(&self) -> Result<(), CompileError> {
        let output = Command::new(&self.rustc)
            .arg("--version")
            .output()
            .map_err(|e| CompileError::ToolchainUnavailable(e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(CompileError::ToolchainUnavailable(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }

    /// Assemble, compile and load a submission.
    ///
    /// The build happens in a fresh temporary directory that stays owned by
    /// the returned artifact; no state is shared between registrations of
    /// the same name.
    pub fn compile(&self, source: &str) -> Result<Arc<PluginArtifact>, CompileError> {
        self.check_toolchain()?;

        let build_dir = tempfile::Builder::new()
            .prefix("tactic-build-")
            .tempdir()?;
        let source_path = build_dir.path().join("plugin.rs");
        let lib_path = build_dir.path().join(format!(
            "{}tactic{}",
            std::env::consts::DLL_PREFIX,
            std::env::consts::DLL_SUFFIX
        ));

        let assembled = format!("{CONTRACT_PRELUDE}\n// ---- user tactic ----\n{source}\n");
        std::fs::write(&source_path, assembled)?;

        let output = Command::new(&self.rustc)
            .args(["--edition", "2021", "--crate-type", "cdylib", "-O", "-o"])
            .arg(&lib_path)
            .arg(&source_path)
            .output()
            .map_err(|e| CompileError::ToolchainUnavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(CompileError::Build {
                diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let lib = unsafe { libloading::Library::new(&lib_path) }
            .map_err(|e| CompileError::Load(e.to_string()))?;

        let vtable = unsafe {
            let abi_version: libloading::Symbol<AbiVersionFn> = lib
                .get(b"policy_abi_version")
                .map_err(|e| CompileError::Load(e.to_string()))?;
            let found = abi_version();
            if found != ABI_VERSION {
                return Err(CompileError::Load(format!(
                    "ABI version mismatch: engine {ABI_VERSION}, plugin {found}"
                )));
            }

            PluginVtable {
                create: *lib
                    .get::<CreateFn>(b"policy_create")
                    .map_err(|e| CompileError::Load(e.to_string()))?,
                destroy: *lib
                    .get::<DestroyFn>(b"policy_destroy")
                    .map_err(|e| CompileError::Load(e.to_string()))?,
                name: *lib
                    .get::<NameFn>(b"policy_name")
                    .map_err(|e| CompileError::Load(e.to_string()))?,
                loadout: *lib
                    .get::<LoadoutFn>(b"policy_loadout")
                    .map_err(|e| CompileError::Load(e.to_string()))?,
                decide: *lib
                    .get::<DecideFn>(b"policy_decide")
                    .map_err(|e| CompileError::Load(e.to_string()))?,
            }
        };

        info!(lib = %lib_path.display(), "compiled dynamic policy");

        let artifact = Arc::new(PluginArtifact {
            vtable,
            _lib: lib,
            _build_dir: build_dir,
        });

        // fail registration early if the type cannot even be constructed
        let probe = PluginArtifact::instantiate(&artifact)?;
        drop(probe);

        Ok(artifact)
    }
}

impl Default for PolicyCompiler {
    fn default() -> Self {
        let compiler = Self::from_env();
        if let Err(e) = compiler.check_toolchain() {
            warn!(error = %e, "policy compiler probe failed; registrations will be rejected");
        }
        compiler
    }
}

/// Starting point handed to tactic authors
pub const TEMPLATE_SOURCE: &str = r#"pub struct UserPolicy;

impl Default for UserPolicy {
    fn default() -> Self {
        UserPolicy
    }
}

impl Tactic for UserPolicy {
    fn name(&self) -> &str {
        "My Custom Tactic"
    }

    fn decide(
        &mut self,
        me: &VehicleView,
        opponent: Option<&VehicleView>,
        _projectiles: &[ProjectileView],
    ) -> Action {
        let Some(opponent) = opponent else {
            return Action::Idle;
        };
        if !me.alive || !opponent.alive {
            return Action::Idle;
        }

        let dx = opponent.x - me.x;
        let dy = opponent.y - me.y;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance < 200.0 && me.can_shoot {
            return Action::Shoot;
        }
        Action::MoveForward(0.7)
    }
}
"#;

/// The contract source prepended to every submission. Self-contained: it
/// compiles with a bare `rustc` and mirrors the engine's ABI types exactly.
const CONTRACT_PRELUDE: &str = r##"// ---- tactic contract (generated) ----
#![allow(dead_code)]

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

const ABI_VERSION: u32 = 1;

#[repr(C)]
pub struct AbiVehicle {
    pub id: [u8; 16],
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub speed: f64,
    pub health: i32,
    pub max_health: i32,
    pub alive: u8,
    pub can_shoot: u8,
    pub ammo: u32,
}

#[repr(C)]
pub struct AbiProjectile {
    pub owner_id: [u8; 16],
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub speed: f64,
}

#[repr(C)]
pub struct AbiAction {
    pub kind: u32,
    pub power: f64,
}

/// What your tactic sees of a vehicle
pub struct VehicleView {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub speed: f64,
    pub health: i32,
    pub max_health: i32,
    pub alive: bool,
    pub can_shoot: bool,
    pub ammo: u32,
}

/// A projectile in flight; `hostile` is false for your own shots
pub struct ProjectileView {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub speed: f64,
    pub hostile: bool,
}

pub enum Action {
    MoveForward(f64),
    MoveBackward(f64),
    TurnLeft(f64),
    TurnRight(f64),
    Shoot,
    Idle,
}

/// Implement this for `UserPolicy`
pub trait Tactic {
    fn name(&self) -> &str {
        "user tactic"
    }

    /// (shooting_range, movement_speed, fire_rate), each 1-5, at most 10
    /// points total
    fn loadout(&self) -> (u8, u8, u8) {
        (1, 1, 1)
    }

    fn decide(
        &mut self,
        me: &VehicleView,
        opponent: Option<&VehicleView>,
        projectiles: &[ProjectileView],
    ) -> Action;
}

fn vehicle_view(raw: &AbiVehicle) -> VehicleView {
    VehicleView {
        x: raw.x,
        y: raw.y,
        heading_deg: raw.heading_deg,
        speed: raw.speed,
        health: raw.health,
        max_health: raw.max_health,
        alive: raw.alive != 0,
        can_shoot: raw.can_shoot != 0,
        ammo: raw.ammo,
    }
}

fn encode_action(action: Action) -> AbiAction {
    let (kind, power) = match action {
        Action::Idle => (0, 0.0),
        Action::MoveForward(p) => (1, p),
        Action::MoveBackward(p) => (2, p),
        Action::TurnLeft(p) => (3, p),
        Action::TurnRight(p) => (4, p),
        Action::Shoot => (5, 0.0),
    };
    AbiAction { kind, power }
}

#[no_mangle]
pub extern "C" fn policy_abi_version() -> u32 {
    ABI_VERSION
}

#[no_mangle]
pub extern "C" fn policy_create() -> *mut c_void {
    match catch_unwind(|| Box::new(UserPolicy::default())) {
        Ok(boxed) => Box::into_raw(boxed) as *mut c_void,
        Err(_) => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub extern "C" fn policy_destroy(handle: *mut c_void) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle as *mut UserPolicy) });
    }
}

#[no_mangle]
pub extern "C" fn policy_name(handle: *mut c_void, buf: *mut u8, cap: usize) -> isize {
    if handle.is_null() || buf.is_null() {
        return -1;
    }
    let result = catch_unwind(AssertUnwindSafe(|| {
        let policy = unsafe { &*(handle as *mut UserPolicy) };
        policy.name().to_string()
    }));
    match result {
        Ok(name) => {
            let bytes = name.as_bytes();
            let len = bytes.len().min(cap);
            unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf, len) };
            len as isize
        }
        Err(_) => -1,
    }
}

#[no_mangle]
pub extern "C" fn policy_loadout(handle: *mut c_void, out: *mut u8) -> i32 {
    if handle.is_null() || out.is_null() {
        return -1;
    }
    let result = catch_unwind(AssertUnwindSafe(|| {
        let policy = unsafe { &*(handle as *mut UserPolicy) };
        policy.loadout()
    }));
    match result {
        Ok((range, speed, rate)) => {
            unsafe {
                *out = range;
                *out.add(1) = speed;
                *out.add(2) = rate;
            }
            0
        }
        Err(_) => -1,
    }
}

#[no_mangle]
pub extern "C" fn policy_decide(
    handle: *mut c_void,
    me: *const AbiVehicle,
    opponent: *const AbiVehicle,
    shots: *const AbiProjectile,
    shot_count: usize,
    out: *mut AbiAction,
) -> i32 {
    if handle.is_null() || me.is_null() || out.is_null() {
        return -1;
    }
    let result = catch_unwind(AssertUnwindSafe(|| {
        let policy = unsafe { &mut *(handle as *mut UserPolicy) };
        let me_raw = unsafe { &*me };
        let me_view = vehicle_view(me_raw);
        let opponent_view = if opponent.is_null() {
            None
        } else {
            Some(vehicle_view(unsafe { &*opponent }))
        };
        let raw_shots: &[AbiProjectile] = if shot_count == 0 || shots.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(shots, shot_count) }
        };
        let shot_views: Vec<ProjectileView> = raw_shots
            .iter()
            .map(|s| ProjectileView {
                x: s.x,
                y: s.y,
                heading_deg: s.heading_deg,
                speed: s.speed,
                hostile: s.owner_id != me_raw.id,
            })
            .collect();

        let action = policy.decide(&me_view, opponent_view.as_ref(), &shot_views);
        unsafe { *out = encode_action(action) };
    }));
    match result {
        Ok(()) => 0,
        Err(_) => -1,
    }
}
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abi_action_decode_clamps_and_defaults() {
        assert_eq!(
            AbiAction {
                kind: 1,
                power: 7.0
            }
            .decode(),
            Action::MoveForward { power: 1.0 }
        );
        assert_eq!(
            AbiAction {
                kind: 4,
                power: -3.0
            }
            .decode(),
            Action::TurnRight { power: 0.0 }
        );
        assert_eq!(
            AbiAction {
                kind: 1,
                power: f64::NAN
            }
            .decode(),
            Action::MoveForward { power: 0.0 }
        );
        assert_eq!(AbiAction { kind: 5, power: 0.9 }.decode(), Action::Shoot);
        assert_eq!(AbiAction { kind: 0, power: 0.5 }.decode(), Action::Idle);
        assert_eq!(
            AbiAction {
                kind: 99,
                power: 0.5
            }
            .decode(),
            Action::Idle
        );
    }

    #[test]
    fn prelude_declares_the_expected_symbols() {
        for symbol in [
            "policy_abi_version",
            "policy_create",
            "policy_destroy",
            "policy_name",
            "policy_loadout",
            "policy_decide",
        ] {
            assert!(
                CONTRACT_PRELUDE.contains(symbol),
                "prelude is missing {symbol}"
            );
        }
    }

    #[test]
    fn garbage_source_yields_build_diagnostics() {
        let compiler = PolicyCompiler::from_env();
        if compiler.check_toolchain().is_err() {
            // toolchain-less environment; nothing to assert here
            return;
        }
        match compiler.compile("this is not rust at all") {
            Err(CompileError::Build { diagnostics }) => {
                assert!(!diagnostics.is_empty());
            }
            Err(other) => panic!("expected Build error, got {other}"),
            Ok(_) => panic!("garbage source must not compile"),
        }
    }

    #[test]
    fn template_source_compiles_loads_and_decides() {
        let compiler = PolicyCompiler::from_env();
        if compiler.check_toolchain().is_err() {
            return;
        }
        let artifact = compiler.compile(TEMPLATE_SOURCE).expect("template compiles");
        let mut policy = PluginArtifact::instantiate(&artifact).expect("instantiates");
        assert_eq!(policy.name(), "My Custom Tactic");
        assert_eq!(policy.loadout(), Loadout::default());

        let me = VehicleView {
            id: uuid::Uuid::new_v4(),
            x: 100.0,
            y: 100.0,
            heading_deg: 0.0,
            speed: 0.0,
            health: 100,
            max_health: 100,
            alive: true,
            can_shoot: true,
            ammo: 50,
        };
        let opponent = VehicleView {
            id: uuid::Uuid::new_v4(),
            x: 600.0,
            ..me
        };
        assert_eq!(
            policy.decide(&me, Some(&opponent), &[]),
            Action::MoveForward { power: 0.7 }
        );

        let close = VehicleView { x: 220.0, ..opponent };
        assert_eq!(policy.decide(&me, Some(&close), &[]), Action::Shoot);
        assert_eq!(policy.decide(&me, None, &[]), Action::Idle);
    }
}
