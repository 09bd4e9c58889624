//! 关节参数 schema
//!
//! 运行时可修改的关节参数是一个固定的枚举集合，而不是任意键值：
//!
//! | 键名 | 类型 | 含义 |
//! |---|---|---|
//! | `limitAdj` | number (deg) | 限位补偿，决定零点步数 |
//! | `maxSpeed` | number (deg/s, > 0) | 设定点默认速度 |
//! | `acceleration` | number (deg/s², > 0) | 轮廓加速度 |
//! | `minPosition` | number (deg) | 设定点下限 |
//! | `maxPosition` | number (deg) | 设定点上限 |
//! | `invert` | bool | 方向取反 |
//!
//! 键名与配置文件中的 `joint.param` 写法一致。

use crate::error::ParamError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单个参数更新（带类型的键值对）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointParam {
    LimitAdj(f64),
    MaxSpeed(f64),
    Acceleration(f64),
    MinPosition(f64),
    MaxPosition(f64),
    Invert(bool),
}

impl JointParam {
    /// 全部合法参数名
    pub const NAMES: [&'static str; 6] = [
        "limitAdj",
        "maxSpeed",
        "acceleration",
        "minPosition",
        "maxPosition",
        "invert",
    ];

    /// 参数名（与配置键一致）
    pub fn name(&self) -> &'static str {
        match self {
            JointParam::LimitAdj(_) => "limitAdj",
            JointParam::MaxSpeed(_) => "maxSpeed",
            JointParam::Acceleration(_) => "acceleration",
            JointParam::MinPosition(_) => "minPosition",
            JointParam::MaxPosition(_) => "maxPosition",
            JointParam::Invert(_) => "invert",
        }
    }

    /// 从配置键值解析
    ///
    /// 未知参数名返回 `ParamError::Unknown`，类型不符返回 `ParamError::InvalidType`。
    pub fn parse(name: &str, value: &Value) -> Result<Self, ParamError> {
        let number = || {
            value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ParamError::InvalidType {
                    name: name.to_string(),
                    expected: "a finite number",
                })
        };

        match name {
            "limitAdj" => Ok(JointParam::LimitAdj(number()?)),
            "maxSpeed" => Ok(JointParam::MaxSpeed(number()?)),
            "acceleration" => Ok(JointParam::Acceleration(number()?)),
            "minPosition" => Ok(JointParam::MinPosition(number()?)),
            "maxPosition" => Ok(JointParam::MaxPosition(number()?)),
            "invert" => value
                .as_bool()
                .map(JointParam::Invert)
                .ok_or_else(|| ParamError::InvalidType {
                    name: name.to_string(),
                    expected: "a boolean",
                }),
            _ => Err(ParamError::Unknown {
                name: name.to_string(),
            }),
        }
    }

    /// 转换为配置值
    pub fn to_value(&self) -> Value {
        match *self {
            JointParam::LimitAdj(v)
            | JointParam::MaxSpeed(v)
            | JointParam::Acceleration(v)
            | JointParam::MinPosition(v)
            | JointParam::MaxPosition(v) => Value::from(v),
            JointParam::Invert(v) => Value::Bool(v),
        }
    }
}

/// 关节参数集合
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JointParams {
    pub limit_adj: f64,
    pub max_speed: f64,
    pub acceleration: f64,
    pub min_position: f64,
    pub max_position: f64,
    pub invert: bool,
}

impl Default for JointParams {
    fn default() -> Self {
        Self {
            limit_adj: 0.0,
            max_speed: 30.0,
            acceleration: 60.0,
            min_position: -180.0,
            max_position: 180.0,
            invert: false,
        }
    }
}

impl JointParams {
    /// 校验单个参数能否应用到当前参数集合上（不修改自身）
    pub fn check(&self, param: &JointParam) -> Result<(), ParamError> {
        let out_of_range = |reason: String| ParamError::OutOfRange {
            name: param.name().to_string(),
            reason,
        };

        match *param {
            JointParam::MaxSpeed(v) | JointParam::Acceleration(v) if v <= 0.0 => {
                Err(out_of_range(format!("{} must be > 0", v)))
            },
            JointParam::MinPosition(v) if v >= self.max_position => Err(out_of_range(format!(
                "{} must be below maxPosition {}",
                v, self.max_position
            ))),
            JointParam::MaxPosition(v) if v <= self.min_position => Err(out_of_range(format!(
                "{} must be above minPosition {}",
                v, self.min_position
            ))),
            _ => Ok(()),
        }
    }

    /// 校验并应用；失败时保持不变
    pub fn apply(&mut self, param: JointParam) -> Result<(), ParamError> {
        self.check(&param)?;
        match param {
            JointParam::LimitAdj(v) => self.limit_adj = v,
            JointParam::MaxSpeed(v) => self.max_speed = v,
            JointParam::Acceleration(v) => self.acceleration = v,
            JointParam::MinPosition(v) => self.min_position = v,
            JointParam::MaxPosition(v) => self.max_position = v,
            JointParam::Invert(v) => self.invert = v,
        }
        Ok(())
    }

    /// 按名称读取参数
    pub fn get(&self, name: &str) -> Option<JointParam> {
        match name {
            "limitAdj" => Some(JointParam::LimitAdj(self.limit_adj)),
            "maxSpeed" => Some(JointParam::MaxSpeed(self.max_speed)),
            "acceleration" => Some(JointParam::Acceleration(self.acceleration)),
            "minPosition" => Some(JointParam::MinPosition(self.min_position)),
            "maxPosition" => Some(JointParam::MaxPosition(self.max_position)),
            "invert" => Some(JointParam::Invert(self.invert)),
            _ => None,
        }
    }

    /// 将位置钳位到 [minPosition, maxPosition]
    pub fn clamp_position(&self, position: f64) -> f64 {
        position.clamp(self.min_position, self.max_position)
    }
}
