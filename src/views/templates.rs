use handlebars::Handlebars;
use std::sync::Arc;

pub type Hbs = Arc<Handlebars<'static>>;

const PRICE_UP: &str = "📈 *{{ticker}}* subiu {{variation}}% hoje e está cotado a R$ {{price}}.\n\
Seu limite de alerta para este fundo é {{threshold}}%.";

const PRICE_DOWN: &str = "📉 *{{ticker}}* caiu {{variation}}% hoje e está cotado a R$ {{price}}.\n\
Seu limite de alerta para este fundo é {{threshold}}%.";

const REPORT: &str = "📄 Novo documento de *{{ticker}}*: {{title}} ({{date}})\n{{url}}";

const DIVIDEND: &str = "💰 *{{ticker}}* anunciou rendimento de R$ {{amount}} por cota.\n\
Data com: {{record_date}} · Pagamento: {{payment_date}}";

const VERIFICATION: &str = "Seu código de verificação FII Alerts é *{{code}}*. \
Ele expira em {{minutes}} minutos. Você também pode responder esta mensagem com o código.";

const VERIFIED: &str = "✅ WhatsApp confirmado! A partir de agora você receberá os alertas dos fundos que acompanha.";

const ALERTS_PAUSED: &str = "🔕 Alertas pausados. Responda VOLTAR para reativar.";

const ALERTS_RESUMED: &str = "🔔 Alertas reativados.";

const PAYMENT_FAILED: &str = "⚠️ Não conseguimos processar o pagamento da sua assinatura {{plan}}. \
Atualize sua forma de pagamento em {{url}} para continuar recebendo alertas.";

pub fn build_handlebars() -> Hbs {
    let mut hb = Handlebars::new();
    // plain text for WhatsApp, no HTML escaping
    hb.register_escape_fn(handlebars::no_escape);
    hb.set_strict_mode(true);

    let templates = [
        ("alerts/price_up", PRICE_UP),
        ("alerts/price_down", PRICE_DOWN),
        ("alerts/report", REPORT),
        ("alerts/dividend", DIVIDEND),
        ("whatsapp/verification", VERIFICATION),
        ("whatsapp/verified", VERIFIED),
        ("whatsapp/alerts_paused", ALERTS_PAUSED),
        ("whatsapp/alerts_resumed", ALERTS_RESUMED),
        ("billing/payment_failed", PAYMENT_FAILED),
    ];

    for (name, source) in templates {
        hb.register_template_string(name, source)
            .unwrap_or_else(|e| panic!("template {name}: {e}"));
    }

    Arc::new(hb)
}

pub fn render(hbs: &Hbs, name: &str, ctx: &serde_json::Value) -> Result<String, String> {
    hbs.render(name, ctx).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_without_html_escaping() {
        let hbs = build_handlebars();
        let out = render(
            &hbs,
            "alerts/report",
            &json!({ "ticker": "HGLG11", "title": "Relatório & Notas", "date": "2026-10-01", "url": "https://x/y?a=1&b=2" }),
        )
        .unwrap();
        assert!(out.contains("Relatório & Notas"));
        assert!(out.contains("a=1&b=2"));
    }

    #[test]
    fn strict_mode_rejects_missing_fields() {
        let hbs = build_handlebars();
        assert!(render(&hbs, "alerts/dividend", &json!({ "ticker": "MXRF11" })).is_err());
    }
}
