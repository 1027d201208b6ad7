#![allow(dead_code, unused_macros)]
use shade_compose::{CompiledShaders, GpuProgram, ShaderValue};

/// compares glsl code line by line, ignoring indentation and empty lines
macro_rules! assert_eq_code {
    ($left: expr, $right: expr) => {
        pretty_assertions::assert_eq!(
            $crate::common::normalize_code($left),
            $crate::common::normalize_code($right)
        )
    };
}

pub fn normalize_code(code: &str) -> Vec<String> {
    code.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Shaders(Vec<(String, String)>),
    Variable(String, ShaderValue),
    Draw(u32),
}

/// records every call a `ModularProgram` makes instead of talking to a gpu
#[derive(Debug, Default)]
pub struct RecordingProgram {
    pub calls: Vec<Call>,
    /// makes `draw` fail with this message
    pub fail_draw: Option<String>,
}

impl RecordingProgram {
    /// `(name, value)` of every upload, in order
    pub fn uploads(&self) -> Vec<(String, ShaderValue)> {
        self.calls.iter().filter_map(|call| match call {
            Call::Variable(name, value) => Some((name.clone(), value.clone())),
            _ => None,
        }).collect()
    }

    pub fn builds(&self) -> usize {
        self.calls.iter().filter(|call| matches!(call, Call::Shaders(_))).count()
    }

    /// the last source set for `stage`
    pub fn shader(&self, stage: &str) -> Option<String> {
        self.calls.iter().rev().find_map(|call| match call {
            Call::Shaders(stages) => stages.iter().find(|(s, _)| s == stage).map(|(_, code)| code.clone()),
            _ => None,
        })
    }

    pub fn clear(&mut self) { self.calls.clear() }
}

impl GpuProgram for RecordingProgram {
    type DrawCall = u32;
    type Error = String;

    fn set_shaders(&mut self, shaders: &CompiledShaders) -> Result<(), String> {
        let stages = shaders.iter().map(|(stage, code)| (stage.to_string(), code.to_string())).collect();
        self.calls.push(Call::Shaders(stages));
        Ok(())
    }

    fn set_variable(&mut self, name: &str, value: &ShaderValue) -> Result<(), String> {
        self.calls.push(Call::Variable(name.to_string(), value.clone()));
        Ok(())
    }

    fn draw(&mut self, vertices: u32) -> Result<(), String> {
        match &self.fail_draw {
            Some(message) => Err(message.clone()),
            None => {
                self.calls.push(Call::Draw(vertices));
                Ok(())
            }
        }
    }
}
