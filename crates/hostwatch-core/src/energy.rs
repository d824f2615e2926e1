//! Electricity cost estimates from instantaneous power draw.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::EnergyConfig;
use crate::error::HostwatchError;
use crate::helpers::{round_to, unix_ms_now};
use crate::system::SystemSnapshot;

/// Consumption and cost of a constant load over an hour, a day and a
/// 30-day month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentCost {
    pub power_w: f64,
    pub hourly_consumption_kwh: f64,
    pub hourly_cost: f64,
    pub daily_consumption_kwh: f64,
    pub daily_cost: f64,
    pub monthly_consumption_kwh: f64,
    pub monthly_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyTotals {
    pub hourly: f64,
    pub daily: f64,
    pub monthly: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyCost {
    pub collected_unix_ms: u64,
    pub total_power_w: f64,
    pub costs: EnergyTotals,
    pub electricity_price_per_kwh: f64,
    pub currency: String,
    pub components: BTreeMap<String, ComponentCost>,
}

#[derive(Debug, Clone)]
pub struct EnergyCalculator {
    price_per_kwh: f64,
    currency: String,
    cpu_tdp_w: f64,
    ram_watts_per_gb: f64,
}

impl EnergyCalculator {
    pub fn new(config: &EnergyConfig) -> Self {
        Self {
            price_per_kwh: config.price_per_kwh,
            currency: config.currency.clone(),
            cpu_tdp_w: config.cpu_tdp_w,
            ram_watts_per_gb: config.ram_watts_per_gb,
        }
    }

    pub fn price_per_kwh(&self) -> f64 {
        self.price_per_kwh
    }

    pub fn set_price(&mut self, price_per_kwh: f64) -> Result<(), HostwatchError> {
        if !price_per_kwh.is_finite() || price_per_kwh <= 0.0 {
            return Err(HostwatchError::InvalidPrice(price_per_kwh));
        }
        self.price_per_kwh = price_per_kwh;
        Ok(())
    }

    pub fn component_cost(&self, power_w: f64) -> ComponentCost {
        let hourly_kwh = power_w / 1000.0;
        let daily_kwh = hourly_kwh * 24.0;
        let monthly_kwh = daily_kwh * 30.0;
        ComponentCost {
            power_w: round_to(power_w, 2),
            hourly_consumption_kwh: round_to(hourly_kwh, 4),
            hourly_cost: round_to(hourly_kwh * self.price_per_kwh, 2),
            daily_consumption_kwh: round_to(daily_kwh, 4),
            daily_cost: round_to(daily_kwh * self.price_per_kwh, 2),
            monthly_consumption_kwh: round_to(monthly_kwh, 4),
            monthly_cost: round_to(monthly_kwh * self.price_per_kwh, 2),
        }
    }

    /// Cost of the GPUs (reported draw), the CPU (TDP scaled by
    /// utilization) and RAM (per used GB).
    pub fn system_cost(&self, snapshot: &SystemSnapshot) -> EnergyCost {
        let mut components = BTreeMap::new();
        let mut total_power = 0.0;

        for gpu in &snapshot.gpus {
            let watts = gpu.power.draw_w;
            total_power += watts;
            components.insert(
                format!("GPU_{}_{}", gpu.index, gpu.name),
                self.component_cost(watts),
            );
        }

        let cpu_watts = self.cpu_tdp_w * snapshot.cpu.percent / 100.0;
        total_power += cpu_watts;
        components.insert("CPU".to_string(), self.component_cost(cpu_watts));

        let ram_watts = snapshot.ram.used_gb * self.ram_watts_per_gb;
        total_power += ram_watts;
        components.insert("RAM".to_string(), self.component_cost(ram_watts));

        let total = self.component_cost(total_power);
        EnergyCost {
            collected_unix_ms: unix_ms_now(),
            total_power_w: round_to(total_power, 2),
            costs: EnergyTotals {
                hourly: total.hourly_cost,
                daily: total.daily_cost,
                monthly: total.monthly_cost,
            },
            electricity_price_per_kwh: self.price_per_kwh,
            currency: self.currency.clone(),
            components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuInfo, GpuPower};
    use crate::system::{CpuInfo, RamInfo};

    fn calculator() -> EnergyCalculator {
        EnergyCalculator::new(&EnergyConfig::default())
    }

    #[test]
    fn component_cost_arithmetic() {
        let c = calculator().component_cost(250.0);
        assert_eq!(c.hourly_consumption_kwh, 0.25);
        assert_eq!(c.hourly_cost, 3.75);
        assert_eq!(c.daily_consumption_kwh, 6.0);
        assert_eq!(c.daily_cost, 90.0);
        assert_eq!(c.monthly_consumption_kwh, 180.0);
        assert_eq!(c.monthly_cost, 2700.0);
    }

    #[test]
    fn zero_watts_costs_nothing() {
        let c = calculator().component_cost(0.0);
        assert_eq!(c, ComponentCost::default());
    }

    #[test]
    fn system_cost_components() {
        let snapshot = SystemSnapshot {
            cpu: CpuInfo {
                percent: 40.0,
                ..CpuInfo::default()
            },
            ram: RamInfo {
                used_gb: 16.0,
                ..RamInfo::default()
            },
            gpus: vec![GpuInfo {
                index: 0,
                name: "RTX 4090".into(),
                power: GpuPower {
                    draw_w: 300.0,
                    limit_w: 450.0,
                },
                ..GpuInfo::default()
            }],
            ..SystemSnapshot::default()
        };
        let cost = calculator().system_cost(&snapshot);
        // 300 + 38 + 8
        assert_eq!(cost.total_power_w, 346.0);
        assert_eq!(cost.components.len(), 3);
        assert_eq!(cost.components["GPU_0_RTX 4090"].power_w, 300.0);
        assert_eq!(cost.components["CPU"].power_w, 38.0);
        assert_eq!(cost.components["RAM"].power_w, 8.0);
        // 0.346 kWh * 15
        assert_eq!(cost.costs.hourly, 5.19);
        assert_eq!(cost.costs.daily, 124.56);
        assert_eq!(cost.currency, "TRY");
    }

    #[test]
    fn rejects_bad_prices() {
        let mut calc = calculator();
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                calc.set_price(bad),
                Err(HostwatchError::InvalidPrice(_))
            ));
        }
        assert_eq!(calc.price_per_kwh(), 15.0);
        calc.set_price(3.2).unwrap();
        assert_eq!(calc.price_per_kwh(), 3.2);
        assert_eq!(calc.component_cost(1000.0).hourly_cost, 3.2);
    }
}
