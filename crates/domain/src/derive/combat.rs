//! Initiative, hit points, BAB, saving throws and armor class.

use super::Pass;
use crate::changes::{Ability, BonusType, ChangeKind, SavingThrowTarget};
use crate::character::{CharacterRecord, ClassLevels};
use crate::sheet::{
    CalculatedArmorClass, CalculatedBab, CalculatedHitPoints, CalculatedSavingThrow, SavingThrows,
};
use crate::sources::{compile_sources, SourceValue};
use crate::stacking::StackedTotal;

/// Substitution key, target and key ability of each save.
pub(super) const SAVES: [(&str, SavingThrowTarget, Ability); 3] = [
    ("fort", SavingThrowTarget::Fortitude, Ability::Constitution),
    ("ref", SavingThrowTarget::Reflex, Ability::Dexterity),
    ("will", SavingThrowTarget::Will, Ability::Wisdom),
];

pub(super) fn base_attack_bonus(record: &CharacterRecord) -> f64 {
    record
        .classes
        .iter()
        .map(|class| f64::from(class.bab_progression.at_level(class.level)))
        .sum()
}

fn class_save(class: &ClassLevels, target: SavingThrowTarget) -> f64 {
    let progression = match target {
        SavingThrowTarget::Fortitude => class.saves.fortitude,
        SavingThrowTarget::Reflex => class.saves.reflex,
        SavingThrowTarget::Will | SavingThrowTarget::All => class.saves.will,
    };
    f64::from(progression.at_level(class.level))
}

pub(super) fn base_save(record: &CharacterRecord, target: SavingThrowTarget) -> f64 {
    record
        .classes
        .iter()
        .map(|class| class_save(class, target))
        .sum()
}

/// One BASE source per class.
fn class_sources(
    record: &CharacterRecord,
    key: &str,
    value: impl Fn(&ClassLevels) -> f64,
) -> Vec<SourceValue> {
    record
        .classes
        .iter()
        .map(|class| {
            SourceValue::fixed(
                format!("class.{}.{key}", class.class_id),
                class.name.clone().unwrap_or_else(|| class.class_id.clone()),
                BonusType::Base,
                value(class),
            )
        })
        .collect()
}

fn without(sources: &[SourceValue], excluded: impl Fn(&SourceValue) -> bool) -> Vec<SourceValue> {
    sources
        .iter()
        .filter(|source| !excluded(source))
        .cloned()
        .collect()
}

impl Pass<'_> {
    pub(super) fn initiative(&mut self) -> StackedTotal {
        let dexterity = self.modifier_of(Ability::Dexterity);
        self.stack_total(
            "initiative.total",
            vec![SourceValue::fixed(
                "ability.dexterity.modifier",
                "Dexterity modifier",
                BonusType::Dexterity,
                dexterity,
            )],
            |kind| matches!(kind, ChangeKind::Initiative),
        )
    }

    pub(super) fn hit_points(&mut self) -> CalculatedHitPoints {
        let hit_points = self.record.hit_points;
        let hit_dice = f64::from(self.record.level());
        let constitution = self.modifier_of(Ability::Constitution);

        let max = self.policy.resolve(vec![
            SourceValue::fixed("hp.rolled", "Rolled hit points", BonusType::Base, hit_points.rolled),
            SourceValue::fixed(
                "ability.constitution.modifier",
                "Constitution modifier",
                BonusType::Untyped,
                hit_dice * constitution,
            ),
        ]);
        let temporary = self.stack(Vec::new(), |kind| matches!(kind, ChangeKind::TemporaryHp));
        let current = max.total - hit_points.damage;

        self.substitutions.insert("hp.max", max.total);
        self.substitutions.insert("hp.temporary", temporary.total);
        self.substitutions.insert("hp.current", current);

        let mut source_values = max.source_values;
        source_values.extend(temporary.source_values);
        CalculatedHitPoints {
            max: max.total,
            current,
            temporary: temporary.total,
            damage: hit_points.damage,
            source_values,
        }
    }

    pub(super) fn bab(&mut self) -> CalculatedBab {
        let base = base_attack_bonus(self.record);
        let fixed = class_sources(self.record, "bab", |class| {
            f64::from(class.bab_progression.at_level(class.level))
        });
        let stacked = self.stack_total("bab.total", fixed, |kind| matches!(kind, ChangeKind::Bab));
        CalculatedBab {
            base,
            total: stacked.total,
            source_values: stacked.source_values,
        }
    }

    pub(super) fn saving_throws(&mut self) -> SavingThrows {
        let [fortitude, reflex, will] = SAVES.map(|(key, target, ability)| {
            let base = base_save(self.record, target);
            let mut fixed = class_sources(self.record, key, |class| class_save(class, target));
            fixed.push(SourceValue::fixed(
                format!("ability.{ability}.modifier"),
                format!("{ability} modifier"),
                BonusType::Untyped,
                self.modifier_of(ability),
            ));
            let stacked = self.stack_total(&format!("savingThrow.{key}.total"), fixed, |kind| {
                matches!(kind, ChangeKind::SavingThrow { saving_throw_unique_id } if saving_throw_unique_id.applies_to(target))
            });
            CalculatedSavingThrow {
                base,
                total: stacked.total,
                ability,
                source_values: stacked.source_values,
            }
        });
        SavingThrows {
            fortitude,
            reflex,
            will,
        }
    }

    pub(super) fn armor_class(&mut self) -> CalculatedArmorClass {
        let natural = self.stack_total("ac.natural", Vec::new(), |kind| {
            matches!(kind, ChangeKind::NaturalAc)
        });
        let size_modifier = self.substitutions.value_or_zero("size.modifier");

        let mut sources = vec![
            SourceValue::fixed("ac.base", "Base armor class", BonusType::Base, 10.0),
            SourceValue::fixed(
                "ability.dexterity.modifier",
                "Dexterity modifier",
                BonusType::Dexterity,
                self.modifier_of(Ability::Dexterity),
            ),
            SourceValue::fixed("size.modifier", "Size", BonusType::Size, size_modifier),
            SourceValue::fixed("ac.natural", "Natural armor", BonusType::NaturalArmor, natural.total),
        ];
        sources.extend(compile_sources(
            self.changes
                .iter()
                .filter(|change| matches!(change.kind, ChangeKind::Ac)),
            &self.substitutions,
            &mut self.warnings,
        ));

        let touch = self.policy.resolve(without(&sources, |source| {
            matches!(
                source.bonus_type_id,
                BonusType::Armor | BonusType::Shield | BonusType::NaturalArmor
            )
        }));
        let flat_footed = self.policy.resolve(without(&sources, |source| {
            source.bonus_type_id == BonusType::Dodge
                || (source.bonus_type_id == BonusType::Dexterity && source.value > 0.0)
        }));
        let total = self.policy.resolve(sources);

        self.substitutions.insert("ac.total", total.total);
        self.substitutions.insert("ac.touch", touch.total);
        self.substitutions.insert("ac.flatFooted", flat_footed.total);

        CalculatedArmorClass {
            total: total.total,
            touch: touch.total,
            flat_footed: flat_footed.total,
            natural,
            source_values: total.source_values,
        }
    }
}
