//! 事件溯源运行时的过程宏
//!
//! - `#[aggregate]`：为聚合的固有 `impl` 块生成 `::evented::aggregate::Aggregate` 实现，
//!   以 `#[command]` 标注的方法注册为命令表条目。
//!
use proc_macro::TokenStream;

mod aggregate;

/// 聚合宏
/// - 仅用于固有 `impl` 块（`impl Order { ... }`）
/// - `#[command]` 方法签名：`fn name(&mut self, payload: P, fx: &mut Effects<'_>)`，
///   `P` 需实现 `DeserializeOwned`
/// - 支持参数：`#[aggregate(name = "order")]`，默认取类型名的小写形式
/// - 方法可通过 `#[command(name = "...")]` 覆写命令名，默认取方法名
#[proc_macro_attribute]
pub fn aggregate(attr: TokenStream, item: TokenStream) -> TokenStream {
    aggregate::expand(attr, item)
}
