use crate::models::question::{Level, Topic};

pub fn questions(topic: Topic, level: Level) -> &'static [&'static str] {
    match (topic, level) {
        (Topic::DataScience, Level::Junior) => &[
            "Что такое переобучение (overfitting) и как с ним бороться?",
            "Какие метрики оценки вы знаете для задач классификации?",
            "Объясните разницу между pandas и numpy?",
            "Что такое кросс-валидация и зачем она нужна?",
            "Как вы работаете с пропущенными значениями в данных?",
        ],
        (Topic::DataScience, Level::Middle) => &[
            "Расскажите о вашем опыте с feature engineering?",
            "Как вы выбираете модели для конкретной бизнес-задачи?",
            "Опишите процесс deployment ML модели?",
            "Какие методы ensemble learning вы применяли?",
            "Как вы оцениваете бизнес-impact ваших моделей?",
        ],
        (Topic::DataScience, Level::Senior) => &[
            "Опишите архитектуру ML системы для реального продукта?",
            "Как вы управляете technical debt в ML проектах?",
            "Какие подходы к мониторингу ML моделей в production?",
            "Как вы выстраиваете MLOps процессы в команде?",
            "Расскажите о самом сложном technical challenge в вашей карьере?",
        ],
        (Topic::MachineLearning, Level::Junior) => &[
            "В чем разница между bagging и boosting?",
            "Что такое gradient descent?",
            "Объясните принцип работы случайного леса?",
            "Что такое regularization и зачем она нужна?",
            "Какие алгоритмы кластеризации вы знаете?",
        ],
        (Topic::MachineLearning, Level::Middle) => &[
            "Как работает attention mechanism в трансформерах?",
            "Опишите процесс fine-tuning предобученных моделей?",
            "Какие методы оптимизации нейронных сетей вы используете?",
            "Как вы боретесь с gradient vanishing problem?",
            "Расскажите о transfer learning на практике?",
        ],
        (Topic::MachineLearning, Level::Senior) => &[
            "Архитектурные trade-offs при выборе моделей для production?",
            "Как вы решаете проблему data drift в продакшене?",
            "Оптимизация inference time больших моделей?",
            "Подходы к explainable AI в сложных системах?",
            "Управление lifecycle ML моделей в масштабе?",
        ],
        (Topic::DataAnalysis, Level::Junior) => &[
            "Какие инструменты для визуализации данных вы используете?",
            "Как вы проводите очистку и предобработку данных?",
            "Что такое SQL и основные операции?",
            "Как вы работаете с выбросами в данных?",
            "Какие типы графиков вы используете для разных задач?",
        ],
        (Topic::DataAnalysis, Level::Middle) => &[
            "Опишите процесс проведения A/B теста?",
            "Как вы создаете и поддерживаете дашборды?",
            "Какие методы прогнозирования вы используете?",
            "Как вы приоритизируете аналитические задачи?",
            "Расскажите о вашем опыте работы с большими данными?",
        ],
        (Topic::DataAnalysis, Level::Senior) => &[
            "Как вы выстраиваете data governance в компании?",
            "Опишите архитектуру аналитической платформы?",
            "Какие подходы к data quality assurance?",
            "Как вы измеряете impact аналитических инициатив?",
            "Расскажите о реализации сложных ETL процессов?",
        ],
        (Topic::SoftwareEngineering, Level::Junior) => &[
            "Что такое ООП и основные принципы?",
            "Объясните разницу между классом и объектом?",
            "Что такое REST API?",
            "Какие структуры данных вы знаете?",
            "Что такое Git и основные команды?",
        ],
        (Topic::SoftwareEngineering, Level::Middle) => &[
            "Опишите принципы SOLID?",
            "Как вы проектируете архитектуру приложения?",
            "Что такое микросервисы и их преимущества?",
            "Какие паттерны проектирования вы используете?",
            "Как вы обеспечиваете качество кода?",
        ],
        (Topic::SoftwareEngineering, Level::Senior) => &[
            "Как вы проектируете scalable systems?",
            "Опишите подходы к performance optimization?",
            "Как вы управляете technical debt?",
            "Какие практики code review вы используете?",
            "Расскажите о вашем опыте лидирования команд?",
        ],
    }
}

/// Greeting that precedes the first question of an interview.
pub fn welcome(name: &str, topic: Topic, level: Level) -> String {
    let intro = match (topic, level) {
        (Topic::DataScience, Level::Junior) => "Привет, {name}! Я ваш технический интервьюер по Data Science.",
        (Topic::DataScience, Level::Middle) => "Здравствуйте, {name}! Я технический интервьюер по Data Science.",
        (Topic::DataScience, Level::Senior) => "Добрый день, {name}! Я senior интервьюер по Data Science.",
        (Topic::MachineLearning, Level::Junior) => "Привет, {name}! Я интервьюер по Machine Learning.",
        (Topic::MachineLearning, Level::Middle) => "Здравствуйте, {name}! Я ML интервьюер.",
        (Topic::MachineLearning, Level::Senior) => "Добрый день, {name}! Я senior ML инженер.",
        (Topic::DataAnalysis, Level::Junior) => "Привет, {name}! Я интервьюер по Data Analysis.",
        (Topic::DataAnalysis, Level::Middle) => "Здравствуйте, {name}! Я аналитик данных.",
        (Topic::DataAnalysis, Level::Senior) => "Добрый день, {name}! Я senior data analyst.",
        (Topic::SoftwareEngineering, Level::Junior) => "Привет, {name}! Я интервьюер по Software Engineering.",
        (Topic::SoftwareEngineering, Level::Middle) => "Здравствуйте, {name}! Я software engineer.",
        (Topic::SoftwareEngineering, Level::Senior) => "Добрый день, {name}! Я senior software engineer.",
    };
    format!("{} Начнем собеседование: ", intro.replace("{name}", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_combination_has_five_distinct_questions() {
        for topic in Topic::ALL {
            for level in Level::ALL {
                let list = questions(topic, level);
                assert_eq!(list.len(), 5, "{} {}", topic, level);
                let unique: HashSet<_> = list.iter().collect();
                assert_eq!(unique.len(), 5, "{} {}", topic, level);
            }
        }
    }

    #[test]
    fn welcome_addresses_the_candidate() {
        let text = welcome("Alice", Topic::SoftwareEngineering, Level::Junior);
        assert!(text.starts_with("Привет, Alice!"));
        assert!(text.contains("Software Engineering"));
        assert!(text.ends_with("Начнем собеседование: "));
    }
}
