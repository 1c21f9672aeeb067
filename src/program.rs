//! Two-stage GPU programs and their uniform tables
//!
//! A program is a vertex and a fragment WGSL source. Before anything reaches
//! the device, both stages are parsed and validated with naga, the stage
//! interface is checked, and the uniform struct is reflected into a table keyed
//! by semantic role. A missing uniform is therefore caught once at load time
//! instead of on every frame.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use log::{debug, info};
use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::{RenderError, Result};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

const FULLSCREEN_WGSL: &str = include_str!("shaders/fullscreen.wgsl");
const AOBENCH_WGSL: &str = include_str!("shaders/aobench.wgsl");
const DISTORTION_WGSL: &str = include_str!("shaders/distortion.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Vertex and fragment source text of one program.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub label: String,
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
}

impl ProgramSource {
    /// Built-in offscreen scene program.
    pub fn scene() -> Self {
        Self {
            label: "aobench".to_string(),
            vertex: Cow::Borrowed(FULLSCREEN_WGSL),
            fragment: Cow::Borrowed(AOBENCH_WGSL),
        }
    }

    /// Built-in lens distortion post-process program.
    pub fn distortion() -> Self {
        Self {
            label: "postprocess".to_string(),
            vertex: Cow::Borrowed(FULLSCREEN_WGSL),
            fragment: Cow::Borrowed(DISTORTION_WGSL),
        }
    }

    pub fn from_files(label: &str, vertex: &Path, fragment: &Path) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                RenderError::Config(format!("failed to load shader {}: {e}", path.display()))
            })
        };
        let source = Self {
            label: label.to_string(),
            vertex: Cow::Owned(read(vertex)?),
            fragment: Cow::Owned(read(fragment)?),
        };
        info!("Load shader [ {} ] OK", vertex.display());
        info!("Load shader [ {} ] OK", fragment.display());
        Ok(source)
    }

    pub fn stage(&self, stage: ShaderStage) -> &str {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
        }
    }
}

/// Parsed and validated stages of a program.
#[derive(Debug)]
pub struct ProgramInterface {
    pub label: String,
    pub vertex: naga::Module,
    pub fragment: naga::Module,
}

impl ProgramInterface {
    pub fn compile(source: &ProgramSource) -> Result<Self> {
        let vertex = compile_stage(source, ShaderStage::Vertex)?;
        let fragment = compile_stage(source, ShaderStage::Fragment)?;
        let program = Self {
            label: source.label.clone(),
            vertex,
            fragment,
        };
        program.link()?;
        info!("Link program '{}' OK", program.label);
        Ok(program)
    }

    /// Check entry points exist and every fragment input is fed by the vertex stage.
    fn link(&self) -> Result<()> {
        let vs = find_entry(&self.vertex, naga::ShaderStage::Vertex, VERTEX_ENTRY)
            .ok_or_else(|| self.link_error(format!("no vertex entry point '{VERTEX_ENTRY}'")))?;
        let fs = find_entry(&self.fragment, naga::ShaderStage::Fragment, FRAGMENT_ENTRY)
            .ok_or_else(|| self.link_error(format!("no fragment entry point '{FRAGMENT_ENTRY}'")))?;

        let mut outputs = Vec::new();
        if let Some(result) = &vs.function.result {
            collect_locations(&self.vertex, result.ty, result.binding.as_ref(), &mut outputs);
        }
        let mut inputs = Vec::new();
        for arg in &fs.function.arguments {
            collect_locations(&self.fragment, arg.ty, arg.binding.as_ref(), &mut inputs);
        }

        match inputs.iter().find(|location| !outputs.contains(location)) {
            Some(missing) => Err(self.link_error(format!(
                "fragment input @location({missing}) is not written by the vertex stage"
            ))),
            None => Ok(()),
        }
    }

    fn link_error(&self, reason: String) -> RenderError {
        RenderError::ShaderLink {
            label: self.label.clone(),
            reason,
        }
    }

    /// Reflect the uniform struct bound at (`group`, `binding`) in either stage.
    pub fn uniforms<R: UniformRole>(&self, group: u32, binding: u32) -> Result<UniformLayout<R>> {
        let module = if find_uniform(&self.fragment, group, binding).is_some() {
            &self.fragment
        } else {
            &self.vertex
        };
        UniformLayout::reflect(module, &self.label, group, binding)
    }
}

fn compile_stage(source: &ProgramSource, stage: ShaderStage) -> Result<naga::Module> {
    let text = source.stage(stage);
    let compile_error = |log: String| RenderError::ShaderCompile {
        label: source.label.clone(),
        stage,
        log,
    };

    let module = naga::front::wgsl::parse_str(text).map_err(|e| compile_error(e.emit_to_string(text)))?;
    Validator::new(ValidationFlags::all(), Capabilities::empty())
        .validate(&module)
        .map_err(|e| compile_error(e.emit_to_string(text)))?;

    debug!("Compile {} shader of '{}' OK", stage, source.label);
    Ok(module)
}

fn find_entry<'m>(
    module: &'m naga::Module,
    stage: naga::ShaderStage,
    name: &str,
) -> Option<&'m naga::EntryPoint> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage && ep.name == name)
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => out.push(*location),
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn find_uniform(module: &naga::Module, group: u32, binding: u32) -> Option<&naga::GlobalVariable> {
    module
        .global_variables
        .iter()
        .map(|(_, var)| var)
        .find(|var| {
            var.space == naga::AddressSpace::Uniform
                && var
                    .binding
                    .as_ref()
                    .is_some_and(|b| b.group == group && b.binding == binding)
        })
}

/// A named member of a program's uniform struct.
pub trait UniformRole: Copy + fmt::Debug + 'static {
    const ALL: &'static [Self];

    /// Member name in the WGSL uniform struct.
    fn name(self) -> &'static str;

    /// Byte size the host writes for this member.
    fn size(self) -> u32;

    /// Position of `self` in [`UniformRole::ALL`].
    fn index(self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: u32,
    pub size: u32,
}

/// Byte layout of a uniform struct, resolved once per program.
#[derive(Debug, Clone)]
pub struct UniformLayout<R> {
    slots: Vec<UniformSlot>,
    span: u32,
    _role: PhantomData<R>,
}

impl<R: UniformRole> UniformLayout<R> {
    pub fn reflect(module: &naga::Module, program: &str, group: u32, binding: u32) -> Result<Self> {
        let not_found = |name| RenderError::UnknownUniform {
            program: program.to_string(),
            name,
        };

        let global = find_uniform(module, group, binding).ok_or_else(|| not_found("<uniform block>"))?;

        let (members, span) = match &module.types[global.ty].inner {
            naga::TypeInner::Struct { members, span } => (members, *span),
            _ => return Err(not_found("<uniform struct>")),
        };

        let gctx = module.to_ctx();
        let slots = R::ALL
            .iter()
            .map(|role| {
                let member = members
                    .iter()
                    .find(|m| m.name.as_deref() == Some(role.name()))
                    .ok_or_else(|| not_found(role.name()))?;
                let size = module.types[member.ty].inner.size(gctx);
                if size != role.size() {
                    return Err(RenderError::ShaderLink {
                        label: program.to_string(),
                        reason: format!(
                            "uniform '{}' is {} bytes, expected {}",
                            role.name(),
                            size,
                            role.size()
                        ),
                    });
                }
                Ok(UniformSlot {
                    offset: member.offset,
                    size,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            slots,
            span,
            _role: PhantomData,
        })
    }

    pub fn slot(&self, role: R) -> UniformSlot {
        self.slots[role.index()]
    }

    /// Size of the whole uniform struct in bytes.
    pub fn span(&self) -> u32 {
        self.span
    }

    pub fn block(&self) -> UniformBlock<'_, R> {
        UniformBlock {
            layout: self,
            bytes: vec![0; self.span as usize],
        }
    }
}

/// CPU-side image of a uniform struct, filled per role.
pub struct UniformBlock<'a, R> {
    layout: &'a UniformLayout<R>,
    bytes: Vec<u8>,
}

impl<R: UniformRole> UniformBlock<'_, R> {
    pub fn set_f32s(&mut self, role: R, values: &[f32]) -> &mut Self {
        self.set_bytes(role, bytemuck::cast_slice(values))
    }

    pub fn set_u32(&mut self, role: R, value: u32) -> &mut Self {
        self.set_bytes(role, bytemuck::bytes_of(&value))
    }

    fn set_bytes(&mut self, role: R, data: &[u8]) -> &mut Self {
        let slot = self.layout.slot(role);
        debug_assert_eq!(
            data.len(),
            slot.size as usize,
            "uniform {:?} expects {} bytes",
            role,
            slot.size
        );
        let start = slot.offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Members of the distortion program's uniform struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistortionUniform {
    LensCenter,
    ScreenCenter,
    Scale,
    ScaleIn,
    HmdWarpParam,
    ChromAbParam,
    Viewport,
}

impl UniformRole for DistortionUniform {
    const ALL: &'static [Self] = &[
        Self::LensCenter,
        Self::ScreenCenter,
        Self::Scale,
        Self::ScaleIn,
        Self::HmdWarpParam,
        Self::ChromAbParam,
        Self::Viewport,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::LensCenter => "lens_center",
            Self::ScreenCenter => "screen_center",
            Self::Scale => "scale",
            Self::ScaleIn => "scale_in",
            Self::HmdWarpParam => "hmd_warp_param",
            Self::ChromAbParam => "chrom_ab_param",
            Self::Viewport => "viewport",
        }
    }

    fn size(self) -> u32 {
        match self {
            Self::HmdWarpParam | Self::ChromAbParam => 16,
            _ => 8,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Members of the scene program's uniform struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneUniform {
    View,
    Resolution,
    Time,
    EyeOffset,
    SolidColor,
    Mode,
}

impl UniformRole for SceneUniform {
    const ALL: &'static [Self] = &[
        Self::View,
        Self::Resolution,
        Self::Time,
        Self::EyeOffset,
        Self::SolidColor,
        Self::Mode,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Resolution => "resolution",
            Self::Time => "time",
            Self::EyeOffset => "eye_offset",
            Self::SolidColor => "solid_color",
            Self::Mode => "mode",
        }
    }

    fn size(self) -> u32 {
        match self {
            Self::View => 64,
            Self::SolidColor => 16,
            Self::Resolution => 8,
            Self::Time | Self::EyeOffset | Self::Mode => 4,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_programs_compile() {
        ProgramInterface::compile(&ProgramSource::scene()).unwrap();
        ProgramInterface::compile(&ProgramSource::distortion()).unwrap();
    }

    #[test]
    fn distortion_layout_matches_wgsl_rules() {
        let program = ProgramInterface::compile(&ProgramSource::distortion()).unwrap();
        let layout: UniformLayout<DistortionUniform> = program.uniforms(0, 2).unwrap();
        assert_eq!(layout.slot(DistortionUniform::LensCenter), UniformSlot { offset: 0, size: 8 });
        assert_eq!(layout.slot(DistortionUniform::ScaleIn), UniformSlot { offset: 24, size: 8 });
        assert_eq!(layout.slot(DistortionUniform::HmdWarpParam), UniformSlot { offset: 32, size: 16 });
        assert_eq!(layout.slot(DistortionUniform::ChromAbParam), UniformSlot { offset: 48, size: 16 });
        assert_eq!(layout.slot(DistortionUniform::Viewport), UniformSlot { offset: 64, size: 8 });
        assert_eq!(layout.span(), 80);
    }

    #[test]
    fn scene_layout_places_mode_after_color() {
        let program = ProgramInterface::compile(&ProgramSource::scene()).unwrap();
        let layout: UniformLayout<SceneUniform> = program.uniforms(0, 0).unwrap();
        assert_eq!(layout.slot(SceneUniform::View), UniformSlot { offset: 0, size: 64 });
        assert_eq!(layout.slot(SceneUniform::EyeOffset), UniformSlot { offset: 76, size: 4 });
        assert_eq!(layout.slot(SceneUniform::Mode), UniformSlot { offset: 96, size: 4 });
    }

    #[test]
    fn block_writes_land_at_member_offsets() {
        let program = ProgramInterface::compile(&ProgramSource::distortion()).unwrap();
        let layout: UniformLayout<DistortionUniform> = program.uniforms(0, 2).unwrap();
        let mut block = layout.block();
        block.set_f32s(DistortionUniform::HmdWarpParam, &[1.0, 2.0, 3.0, 4.0]);
        let floats: &[f32] = bytemuck::cast_slice(block.as_bytes());
        assert_eq!(&floats[8..12], &[1.0, 2.0, 3.0, 4.0]);
        assert!(floats[..8].iter().all(|v| *v == 0.0));
    }

    #[derive(Debug, Clone, Copy)]
    struct Missing;

    impl UniformRole for Missing {
        const ALL: &'static [Self] = &[Missing];
        fn name(self) -> &'static str {
            "eye_offset_x"
        }
        fn size(self) -> u32 {
            4
        }
        fn index(self) -> usize {
            0
        }
    }

    #[test]
    fn unknown_uniform_fails_at_load() {
        let program = ProgramInterface::compile(&ProgramSource::distortion()).unwrap();
        let err = program.uniforms::<Missing>(0, 2).unwrap_err();
        assert!(matches!(err, RenderError::UnknownUniform { name: "eye_offset_x", .. }));
    }

    #[test]
    fn mistyped_uniform_fails_at_load() {
        let mut source = ProgramSource::scene();
        let fragment = AOBENCH_WGSL
            .replacen("    time: f32,", "    time: vec2<f32>,", 1)
            .replace("scene.time", "scene.time.x");
        assert_ne!(fragment, AOBENCH_WGSL);
        source.fragment = Cow::Owned(fragment);

        let program = ProgramInterface::compile(&source).unwrap();
        match program.uniforms::<SceneUniform>(0, 0) {
            Err(RenderError::ShaderLink { reason, .. }) => assert!(reason.contains("'time'")),
            other => panic!("expected a link error, got {other:?}"),
        }
    }

    #[test]
    fn syntax_error_reports_compiler_log() {
        let mut source = ProgramSource::distortion();
        source.fragment = Cow::Borrowed("@fragment fn fs_main( -> @location(0) vec4<f32> {}");
        match ProgramInterface::compile(&source) {
            Err(RenderError::ShaderCompile { stage, log, .. }) => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn unfed_fragment_input_fails_to_link() {
        let mut source = ProgramSource::distortion();
        source.fragment = Cow::Borrowed(
            "@fragment fn fs_main(@location(3) tint: vec4<f32>) -> @location(0) vec4<f32> { return tint; }",
        );
        assert!(matches!(
            ProgramInterface::compile(&source),
            Err(RenderError::ShaderLink { .. })
        ));
    }

    #[test]
    fn missing_entry_point_fails_to_link() {
        let mut source = ProgramSource::scene();
        source.fragment = Cow::Borrowed(
            "@fragment fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> { return vec4<f32>(uv, 0.0, 1.0); }",
        );
        assert!(matches!(
            ProgramInterface::compile(&source),
            Err(RenderError::ShaderLink { .. })
        ));
    }
}
