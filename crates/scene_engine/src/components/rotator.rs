//! Constant-speed rotation

use crate::foundation::math::utils::deg_to_rad;
use crate::scene::{Component, ComponentContext, ComponentKind, ComponentParams, ParamValue};

/// Rotates its entity every tick
#[derive(Debug, Clone, PartialEq)]
pub struct Rotator {
    /// Angular speed in radians per second
    pub speed: f32,
}

impl Default for Rotator {
    fn default() -> Self {
        Self { speed: 1.0 }
    }
}

impl Component for Rotator {
    fn initialize(&mut self, _ctx: &mut ComponentContext<'_>, params: Option<&ComponentParams>) {
        if let Some(degrees) = params.and_then(|p| p.get_f32("degrees_per_second")) {
            self.speed = deg_to_rad(degrees);
        }
    }

    fn update(&mut self, ctx: &mut ComponentContext<'_>) {
        let delta = self.speed * ctx.delta_time;
        ctx.scene.with_transform(ctx.entity, |transform| transform.rotate(delta));
    }

    fn apply_override(&mut self, field: &str, value: &ParamValue) -> bool {
        match (field, value.as_f32()) {
            ("speed", Some(speed)) => {
                self.speed = speed;
                true
            }
            _ => false,
        }
    }
}

impl ComponentKind for Rotator {
    const TAG: &'static str = "rotator";
}
