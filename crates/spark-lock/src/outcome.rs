//! 双通道执行结果 [`Outcome`]。
//!
//! # 设计背景（Why）
//! - 锁执行链需要一个“成功/失败两条通道互不干扰”的结果容器：`map`/`flat_map` 仅作用于成功通道，
//!   `map_error`/`flat_map_error` 仅作用于失败通道；
//! - 与 `std::result::Result` 可以无损互转（[`Outcome::into_result`]、`From<Result>`），
//!   方便调用方在边界处回到 `?` 传播。
//!
//! # 契约（What）
//! - 恰好一条通道有值；在缺失的通道上调用 [`Outcome::value`] / [`Outcome::error`] 属于编程错误，
//!   直接 panic，不作为领域失败建模；
//! - `flat_map` 在成功通道、`flat_map_error` 在失败通道上各自满足左/右单位元与结合律。

/// 成功或失败二选一的结果。
#[must_use = "Outcome 可能携带失败，调用方必须检查"]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome<T, E> {
    /// 成功通道。
    Success(T),
    /// 失败通道。
    Failure(E),
}

impl<T, E> Outcome<T, E> {
    /// 构造成功结果。
    pub fn of(value: T) -> Self {
        Self::Success(value)
    }

    /// 构造失败结果。
    pub fn of_error(error: E) -> Self {
        Self::Failure(error)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    /// 变换成功通道；失败原样返回。
    pub fn map<K, F>(self, mapper: F) -> Outcome<K, E>
    where
        F: FnOnce(T) -> K,
    {
        match self {
            Self::Success(value) => Outcome::Success(mapper(value)),
            Self::Failure(error) => Outcome::Failure(error),
        }
    }

    /// 以返回 `Outcome` 的函数串联成功通道；失败原样返回。
    pub fn flat_map<K, F>(self, mapper: F) -> Outcome<K, E>
    where
        F: FnOnce(T) -> Outcome<K, E>,
    {
        match self {
            Self::Success(value) => mapper(value),
            Self::Failure(error) => Outcome::Failure(error),
        }
    }

    /// 变换失败通道；成功原样返回。
    pub fn map_error<K, F>(self, mapper: F) -> Outcome<T, K>
    where
        F: FnOnce(E) -> K,
    {
        match self {
            Self::Success(value) => Outcome::Success(value),
            Self::Failure(error) => Outcome::Failure(mapper(error)),
        }
    }

    /// 以返回 `Outcome` 的函数串联失败通道；成功原样返回。
    pub fn flat_map_error<K, F>(self, mapper: F) -> Outcome<T, K>
    where
        F: FnOnce(E) -> Outcome<T, K>,
    {
        match self {
            Self::Success(value) => Outcome::Success(value),
            Self::Failure(error) => mapper(error),
        }
    }

    /// 成功时执行副作用回调，返回自身。
    pub fn on_success<F>(self, action: F) -> Self
    where
        F: FnOnce(&T),
    {
        if let Self::Success(value) = &self {
            action(value);
        }
        self
    }

    /// 失败时执行副作用回调，返回自身。
    pub fn on_error<F>(self, action: F) -> Self
    where
        F: FnOnce(&E),
    {
        if let Self::Failure(error) = &self {
            action(error);
        }
        self
    }

    /// 取出成功值。
    ///
    /// # Panics
    /// 在失败结果上调用时 panic：成功通道不存在属于调用方的编程错误。
    #[track_caller]
    pub fn value(self) -> T {
        match self {
            Self::Success(value) => value,
            Self::Failure(_) => panic!("Outcome::value called on a Failure: success channel not present"),
        }
    }

    /// 取出失败值。
    ///
    /// # Panics
    /// 在成功结果上调用时 panic：失败通道不存在属于调用方的编程错误。
    #[track_caller]
    pub fn error(self) -> E {
        match self {
            Self::Success(_) => panic!("Outcome::error called on a Success: error channel not present"),
            Self::Failure(error) => error,
        }
    }

    pub fn as_value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&E> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    /// 转换为标准库 `Result`，以便在边界处使用 `?`。
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failure(error),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Result<T, E> {
    fn from(outcome: Outcome<T, E>) -> Self {
        outcome.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subtract_ten(value: i32) -> Outcome<i32, &'static str> {
        if value < 10 {
            Outcome::of_error("lower")
        } else {
            Outcome::of(value - 10)
        }
    }

    #[test]
    fn flat_map_left_identity_example() {
        assert_eq!(Outcome::of(20).flat_map(subtract_ten).value(), 10);
        assert_eq!(Outcome::of(5).flat_map(subtract_ten).error(), "lower");
    }

    #[test]
    fn channels_are_independent() {
        let failure: Outcome<i32, &str> = Outcome::of_error("nope");
        assert_eq!(failure.map(|value| value + 1), Outcome::Failure("nope"));

        let success: Outcome<i32, &str> = Outcome::of(1);
        assert_eq!(success.map_error(str::len), Outcome::Success(1));
        assert_eq!(
            Outcome::<i32, &str>::of_error("abc").map_error(str::len),
            Outcome::Failure(3)
        );
    }

    #[test]
    fn side_effect_hooks_fire_on_matching_channel_only() {
        let mut seen = Vec::new();
        let _ = Outcome::<i32, i32>::of(1)
            .on_success(|value| seen.push(("success", *value)))
            .on_error(|error| seen.push(("error", *error)));
        let _ = Outcome::<i32, i32>::of_error(2)
            .on_success(|value| seen.push(("success", *value)))
            .on_error(|error| seen.push(("error", *error)));
        assert_eq!(seen, vec![("success", 1), ("error", 2)]);
    }

    #[test]
    #[should_panic(expected = "success channel not present")]
    fn value_on_failure_panics() {
        let _ = Outcome::<i32, &str>::of_error("boom").value();
    }

    #[test]
    #[should_panic(expected = "error channel not present")]
    fn error_on_success_panics() {
        let _ = Outcome::<i32, &str>::of(1).error();
    }

    #[test]
    fn converts_to_and_from_result() {
        let outcome: Outcome<u8, String> = Ok(7).into();
        assert_eq!(outcome.as_value(), Some(&7));
        let result: Result<u8, String> = Outcome::of_error("e".to_owned()).into();
        assert_eq!(result, Err("e".to_owned()));
    }
}
