use std::sync::{Arc, OnceLock};
use tracing::trace;

use super::emitter::ClickEmitter;

pub static GLOBAL_CLICK_EMITTER: OnceLock<Arc<dyn ClickEmitter>> = OnceLock::new();

/// 初始化全局点击发射器（只允许初始化一次）
pub fn set_global_click_emitter(emitter: Arc<dyn ClickEmitter>) {
    if GLOBAL_CLICK_EMITTER.set(emitter).is_err() {
        panic!("GLOBAL_CLICK_EMITTER has already been set");
    }
}

/// 获取全局点击发射器
pub fn get_click_emitter() -> Option<&'static Arc<dyn ClickEmitter>> {
    match GLOBAL_CLICK_EMITTER.get() {
        Some(emitter) => Some(emitter),
        None => {
            trace!("GLOBAL_CLICK_EMITTER has not been initialized yet");
            None
        }
    }
}
