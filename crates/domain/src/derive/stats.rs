//! Size, ability scores, skills and speeds.

use std::collections::{BTreeMap, BTreeSet};

use super::Pass;
use crate::changes::{Ability, BonusType, ChangeKind};
use crate::character::SizeCategory;
use crate::sheet::{CalculatedAbility, CalculatedSize, CalculatedSkill};
use crate::sources::SourceValue;
use crate::stacking::StackedTotal;

/// `floor((score - 10) / 2)`.
pub(crate) fn ability_modifier(score: f64) -> f64 {
    ((score - 10.0) / 2.0).floor()
}

impl Pass<'_> {
    pub(super) fn size(&mut self) -> CalculatedSize {
        let base = self.record.size;
        let stacked = self.stack(
            vec![SourceValue::fixed(
                "size.base",
                "Base size",
                BonusType::Base,
                f64::from(base.value()),
            )],
            |kind| matches!(kind, ChangeKind::Size),
        );
        let category = SizeCategory::from_value(stacked.total.round() as i32);
        let modifier = f64::from(category.modifier());

        self.substitutions.insert("size.total", stacked.total);
        self.substitutions.insert("size.modifier", modifier);

        CalculatedSize {
            base,
            category,
            value: stacked.total,
            modifier,
            source_values: stacked.source_values,
        }
    }

    pub(super) fn abilities(&mut self) -> BTreeMap<Ability, CalculatedAbility> {
        let mut abilities = BTreeMap::new();
        for ability in Ability::ALL {
            let base_score = self.record.ability_score(ability);
            let score = self.stack(
                vec![SourceValue::fixed(
                    format!("ability.{ability}.base"),
                    format!("Base {ability}"),
                    BonusType::Base,
                    base_score,
                )],
                |kind| {
                    matches!(kind, ChangeKind::AbilityScore { ability_unique_id } if *ability_unique_id == ability)
                },
            );
            let modifier = ability_modifier(score.total);
            self.substitutions
                .insert(format!("ability.{ability}.score"), score.total);
            self.substitutions
                .insert(format!("ability.{ability}.modifier"), modifier);

            let check = self.stack_total(
                &format!("ability.{ability}.check"),
                vec![SourceValue::fixed(
                    format!("ability.{ability}.modifier"),
                    format!("{ability} modifier"),
                    BonusType::Base,
                    modifier,
                )],
                |kind| {
                    matches!(kind, ChangeKind::AbilityChecks { ability_unique_id } if *ability_unique_id == ability)
                },
            );

            abilities.insert(
                ability,
                CalculatedAbility {
                    unique_id: ability,
                    base_score,
                    total_score: score.total,
                    modifier,
                    check_total: check.total,
                    source_values: score.source_values,
                    check_source_values: check
                        .source_values
                        .into_iter()
                        .filter(|source| source.source_unique_id != format!("ability.{ability}.modifier"))
                        .collect(),
                },
            );
        }
        abilities
    }

    pub(super) fn modifier_of(&self, ability: Ability) -> f64 {
        self.substitutions
            .value_or_zero(&format!("ability.{ability}.modifier"))
    }

    pub(super) fn skills(&mut self) -> BTreeMap<String, CalculatedSkill> {
        let record = self.record;
        let mut skills = BTreeMap::new();
        for (skill_id, ranks) in &record.skill_ranks {
            let ability = ranks.ability;
            let ability_modifier = self.modifier_of(ability);
            let stacked = self.stack_total(
                &format!("skills.{skill_id}.total"),
                vec![
                    SourceValue::fixed(
                        format!("skills.{skill_id}.ranks"),
                        "Ranks",
                        BonusType::Base,
                        ranks.ranks,
                    ),
                    SourceValue::fixed(
                        format!("ability.{ability}.modifier"),
                        format!("{ability} modifier"),
                        BonusType::Untyped,
                        ability_modifier,
                    ),
                ],
                |kind| match kind {
                    ChangeKind::Skill { skill_unique_id } => skill_unique_id == skill_id,
                    ChangeKind::AbilitySkills { ability_unique_id } => *ability_unique_id == ability,
                    _ => false,
                },
            );
            skills.insert(
                skill_id.clone(),
                CalculatedSkill {
                    unique_id: skill_id.clone(),
                    ability,
                    ranks: ranks.ranks,
                    total: stacked.total,
                    source_values: stacked.source_values,
                },
            );
        }
        skills
    }

    /// Every base speed plus speeds only granted by changes.
    pub(super) fn speeds(&mut self) -> BTreeMap<String, StackedTotal> {
        let mut ids: BTreeSet<String> = self.record.base_speeds.keys().cloned().collect();
        ids.extend(self.changes.iter().filter_map(|change| match &change.kind {
            ChangeKind::Speed { speed_unique_id } => Some(speed_unique_id.clone()),
            _ => None,
        }));

        let mut speeds = BTreeMap::new();
        for speed_id in ids {
            let base = self.record.base_speeds.get(&speed_id).copied().unwrap_or(0.0);
            let stacked = self.stack_total(
                &format!("speed.{speed_id}.total"),
                vec![SourceValue::fixed(
                    format!("speed.{speed_id}.base"),
                    format!("Base {speed_id} speed"),
                    BonusType::Base,
                    base,
                )],
                |kind| matches!(kind, ChangeKind::Speed { speed_unique_id } if *speed_unique_id == speed_id),
            );
            speeds.insert(speed_id, stacked);
        }
        speeds
    }
}
