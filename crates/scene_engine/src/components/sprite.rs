//! Sprite rendering
//!
//! Draws a mesh (a quad by default) with a shader exposing:
//! - `a_position` (vec2, required) and `a_uv` (vec2, optional)
//! - `u_transform` (mat4): model-view-projection from the transform stack
//! - `u_color` (vec4): tint
//! - `u_texture` (sampler2D): optional texture

use std::sync::Arc;

use crate::render::{
    ProgramId, Renderable, ShaderAttribute, ShaderProgram, ShaderUniform, Texture, UniformBinder, UniformKind,
    UniformValue,
};
use crate::scene::{Component, ComponentContext, ComponentKind, ComponentParams, ParamValue, RenderContext};

/// Renders its entity as a sprite
pub struct SpriteRenderer {
    mesh: String,
    shader: String,
    texture_name: Option<String>,
    color: [f32; 4],
    texture: Option<Arc<Texture>>,
    renderable: Renderable,
}

impl Default for SpriteRenderer {
    fn default() -> Self {
        Self {
            mesh: "quad".to_string(),
            shader: "sprite".to_string(),
            texture_name: None,
            color: [1.0; 4],
            texture: None,
            renderable: Renderable::new(),
        }
    }
}

impl SpriteRenderer {
    /// Interface of the program this component expects under the `sprite` name
    pub fn program_interface(id: ProgramId) -> ShaderProgram {
        ShaderProgram::from_linked(
            id,
            "sprite",
            vec![ShaderAttribute::new("a_position", 0, 2), ShaderAttribute::optional("a_uv", 1, 2)],
            vec![
                ShaderUniform::new("u_transform", 0, UniformKind::Mat4),
                ShaderUniform::new("u_color", 1, UniformKind::Vec4),
                ShaderUniform::new("u_texture", 2, UniformKind::Sampler2D),
            ],
        )
    }

    /// Tint color
    pub fn color(&self) -> [f32; 4] {
        self.color
    }

    /// Change the tint
    pub fn set_color(&mut self, color: [f32; 4]) {
        self.color = color;
        self.install_uniforms();
    }

    /// Texture in use
    pub fn texture(&self) -> Option<&Arc<Texture>> {
        self.texture.as_ref()
    }

    /// Replace the texture
    pub fn set_texture(&mut self, texture: Option<Arc<Texture>>) {
        self.texture = texture;
        self.install_uniforms();
    }

    /// The underlying renderable
    pub fn renderable(&self) -> &Renderable {
        &self.renderable
    }

    fn install_uniforms(&mut self) {
        let color = self.color;
        let texture = self.texture.clone();
        self.renderable.set_uniform_callback(Box::new(move |uniform: &ShaderUniform, binder: &mut UniformBinder<'_>| {
            match uniform.name.as_str() {
                "u_transform" => {
                    let transform = binder.current_transform();
                    binder.set_matrix(uniform, &transform);
                }
                "u_color" => {
                    binder.set(uniform, UniformValue::Vec4(color));
                }
                "u_texture" => {
                    if let Some(texture) = &texture {
                        binder.set_texture(uniform, texture);
                    }
                }
                other => log::trace!("Sprite has no value for uniform '{}'", other),
            }
        }));
    }
}

impl Component for SpriteRenderer {
    fn initialize(&mut self, ctx: &mut ComponentContext<'_>, params: Option<&ComponentParams>) {
        if let Some(params) = params {
            if let Some(color) = params.get_color("color") {
                self.color = color;
            }
            if let Some(texture) = params.get_str("texture") {
                self.texture_name = Some(texture.to_string());
            }
        }

        let resources = ctx.resources();
        match resources.mesh(&self.mesh) {
            Some(mesh) => self.renderable.set_mesh(mesh),
            None => log::error!("Sprite on {:?}: mesh '{}' not available", ctx.entity, self.mesh),
        }
        match resources.shader(&self.shader) {
            Some(shader) => self.renderable.set_shader(shader),
            None => log::error!("Sprite on {:?}: shader '{}' not available", ctx.entity, self.shader),
        }
        if let Some(name) = &self.texture_name {
            self.texture = resources.texture(name);
        }
        self.install_uniforms();
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        self.renderable.render(ctx.state);
    }

    fn death(&mut self, ctx: &mut ComponentContext<'_>) {
        if let Some(ticket) = self.renderable.dispose_deferred(ctx.gpu()) {
            log::trace!("Sprite buffers released at frame generation {}", ticket.generation());
        }
    }

    fn apply_override(&mut self, field: &str, value: &ParamValue) -> bool {
        match field {
            "mesh" | "shader" | "texture" => {
                let Some(name) = value.as_str() else {
                    return false;
                };
                match field {
                    "mesh" => self.mesh = name.to_string(),
                    "shader" => self.shader = name.to_string(),
                    _ => self.texture_name = Some(name.to_string()),
                }
                true
            }
            "color" => match value.as_color() {
                Some(color) => {
                    self.color = color;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}

impl ComponentKind for SpriteRenderer {
    const TAG: &'static str = "sprite";
    const SINGLETON: bool = true;
}
