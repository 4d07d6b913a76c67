// 该文件是 Maogou （猫狗） 项目的一部分。
// src/completion.rs - 一次性完成通知
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

/// 保证回调恰好执行一次：要么通过 [`Completion::resolve`] 显式完成，
/// 要么在被丢弃时（任务未执行、线程崩溃）以 `fallback` 的结果完成。
pub struct Completion<T, F: FnOnce(T)> {
  callback: Option<F>,
  fallback: fn() -> T,
}

impl<T, F: FnOnce(T)> Completion<T, F> {
  pub fn new(callback: F, fallback: fn() -> T) -> Self {
    Self {
      callback: Some(callback),
      fallback,
    }
  }

  pub fn resolve(mut self, value: T) {
    if let Some(callback) = self.callback.take() {
      callback(value);
    }
  }
}

impl<T, F: FnOnce(T)> Drop for Completion<T, F> {
  fn drop(&mut self) {
    if let Some(callback) = self.callback.take() {
      callback((self.fallback)());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;

  #[test]
  fn resolve_runs_callback_once() {
    let seen = RefCell::new(Vec::new());
    let completion = Completion::new(|v: i32| seen.borrow_mut().push(v), || -1);
    completion.resolve(7);
    assert_eq!(*seen.borrow(), vec![7]);
  }

  #[test]
  fn dropping_falls_back() {
    let seen = RefCell::new(Vec::new());
    drop(Completion::new(|v: i32| seen.borrow_mut().push(v), || -1));
    assert_eq!(*seen.borrow(), vec![-1]);
  }
}
